use chrono::Utc;

pub fn now_i64() -> i64 {
    Utc::now().timestamp()
}

/// Unix timestamp `seconds` from now.
pub fn expires_in(seconds: i64) -> i64 {
    now_i64() + seconds
}

/// `true` once `expires_at` is less than `margin_seconds` away.
pub fn is_expired(expires_at: i64, margin_seconds: i64) -> bool {
    expires_at - margin_seconds <= now_i64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn margin_brings_expiry_forward() {
        assert!(is_expired(now_i64() - 1, 0));
        assert!(!is_expired(expires_in(3600), 60));
        assert!(is_expired(expires_in(30), 60));
    }
}
