//! Idempotency keys for payment creation

use brew::{orders::OrderUuid, payments::models::PaymentMethod};
use jiff::Timestamp;
use rand::Rng;

/// Header carrying the key.
pub(crate) const IDEMPOTENCY_HEADER: &str = "X-Idempotency-Key";

const SUFFIX_LEN: usize = 9;

/// `payment_{order}_{method}_{unix_ms}_{random}`. A retried request reusing
/// the key cannot create a second payment.
pub(crate) fn idempotency_key(order_id: OrderUuid, method: PaymentMethod, now: Timestamp) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .filter_map(|_| char::from_digit(rng.gen_range(0..36), 36))
        .collect();

    format!(
        "payment_{order_id}_{}_{}_{suffix}",
        method.endpoint_segment(),
        now.as_millisecond()
    )
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn keys_name_the_order_method_and_time() -> TestResult {
        let order_id: OrderUuid = "01936f3c-0000-7000-8000-000000000001".parse()?;
        let now = Timestamp::from_millisecond(1_767_225_600_123)?;
        let key = idempotency_key(order_id, PaymentMethod::QrTransfer, now);

        let prefix = "payment_01936f3c-0000-7000-8000-000000000001_paynow_1767225600123_";

        assert!(key.starts_with(prefix), "unexpected key {key}");

        let suffix = key.trim_start_matches(prefix);

        assert_eq!(suffix.len(), SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));

        Ok(())
    }

    #[test]
    fn keys_differ_between_requests() {
        let order_id = OrderUuid::now_v7();
        let now = Timestamp::UNIX_EPOCH;

        assert_ne!(
            idempotency_key(order_id, PaymentMethod::Card, now),
            idempotency_key(order_id, PaymentMethod::Card, now)
        );
    }
}
