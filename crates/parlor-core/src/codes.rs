use rand::Rng;

/// Join codes are six decimal digits.
pub const CODE_LEN: usize = 6;

/// Draw a random candidate code. Uniqueness is enforced by the rooms table;
/// on collision the caller redraws.
pub fn generate() -> String {
    let mut rng = rand::rng();
    (0..CODE_LEN).map(|_| char::from(b'0' + rng.random_range(0..10))).collect()
}

/// A well-formed join code is exactly six ASCII digits.
pub fn is_valid(code: &str) -> bool {
    code.len() == CODE_LEN && code.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..100 {
            let code = generate();
            assert_eq!(code.len(), CODE_LEN);
            assert!(code.bytes().all(|b| b.is_ascii_digit()));
            assert!(is_valid(&code));
        }
    }

    #[test]
    fn validation_rejects_malformed_codes() {
        assert!(is_valid("000000"));
        assert!(is_valid("123456"));
        assert!(!is_valid("12345"));
        assert!(!is_valid("1234567"));
        assert!(!is_valid("12345a"));
        assert!(!is_valid("12 456"));
        assert!(!is_valid(""));
    }
}
