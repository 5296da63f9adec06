use std::num::NonZeroUsize;

use rand::distr::Alphanumeric;
use rand::Rng;

pub const DEFAULT_LENGTH: NonZeroUsize = match NonZeroUsize::new(22) {
    Some(length) => length,
    None => unreachable!(),
};

const SYMBOLS: &[u8] = b"!@#$%^&*-_+=.,?";
const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Random secret of `length` characters, alphanumeric unless `symbols` is set.
pub fn generate(length: NonZeroUsize, symbols: bool) -> String {
    let mut rng = rand::rng();
    if !symbols {
        return (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(length.get())
            .map(char::from)
            .collect();
    }

    let charset: Vec<u8> = ALPHANUMERIC.iter().chain(SYMBOLS).copied().collect();
    (0..length.get())
        .map(|_| char::from(charset[rng.random_range(0..charset.len())]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn honours_length_and_charset() {
        let length = NonZeroUsize::new(40).unwrap();
        let plain = generate(length, false);
        assert_eq!(plain.len(), 40);
        assert!(plain.chars().all(|c| c.is_ascii_alphanumeric()));

        let with_symbols = generate(length, true);
        assert_eq!(with_symbols.len(), 40);
        assert!(with_symbols
            .bytes()
            .all(|b| ALPHANUMERIC.contains(&b) || SYMBOLS.contains(&b)));
    }
}
