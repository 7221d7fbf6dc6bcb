/// Checks a gateway's callback signature. Cryptography is the implementor's
/// business; the core only branches on the answer.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, order_id: &str, payment_id: &str, signature: &str) -> bool;
}

impl<F> SignatureVerifier for F
where
    F: Fn(&str, &str, &str) -> bool + Send + Sync,
{
    fn verify(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        self(order_id, payment_id, signature)
    }
}
