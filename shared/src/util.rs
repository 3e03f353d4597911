/// Current UTC timestamp in milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate a human-readable order number.
///
/// Layout: `ORD` + UTC date + 4 random digits, e.g. `ORD20260829-4821`.
/// Uniqueness is owned by the order store; this is the display form shown
/// to customers and restaurant staff.
pub fn order_number() -> String {
    use rand::Rng;
    let date = chrono::Utc::now().format("%Y%m%d");
    let suffix: u16 = rand::thread_rng().gen_range(1000..10000);
    format!("ORD{date}-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_number_has_expected_shape() {
        let n = order_number();
        assert!(n.starts_with("ORD"));
        assert_eq!(n.len(), "ORD20260829-4821".len());
    }
}
