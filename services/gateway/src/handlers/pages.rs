//! Landing pages for the processor's redirect URLs

pub async fn success() -> &'static str {
    "Payment Successful!"
}

pub async fn cancel() -> &'static str {
    "Payment Cancelled!"
}

pub async fn connect_success() -> &'static str {
    "Stripe Account Connected successfully!"
}

pub async fn connect_refresh() -> &'static str {
    "Please refresh or restart onboarding."
}
