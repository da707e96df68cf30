use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;

const SUFFIX_LEN: usize = 12;

/// Generate a ledger reference: `TXN` + date + random uppercase suffix,
/// e.g. `TXN20260829K3QD81ZPMW4A`. Collisions are negligible but the
/// column is UNIQUE and stores retry insertion a bounded number of times.
pub fn generate_reference(now: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(|c| (c as char).to_ascii_uppercase())
        .collect();
    format!("TXN{}{}", now.format("%Y%m%d"), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_has_prefix_date_and_suffix() {
        let now = Utc::now();
        let reference = generate_reference(now);
        assert!(reference.starts_with("TXN"));
        assert_eq!(reference.len(), 3 + 8 + SUFFIX_LEN);
        assert!(reference.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(reference, reference.to_ascii_uppercase());
    }

    #[test]
    fn references_do_not_trivially_collide() {
        let now = Utc::now();
        let a = generate_reference(now);
        let b = generate_reference(now);
        assert_ne!(a, b);
    }
}
