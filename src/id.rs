use rand::Rng;
use uuid::Uuid;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

pub fn new_uuid_v4() -> String {
    Uuid::new_v4().to_string()
}

/// Random lowercase base-36 string of `len` characters.
pub fn random_base36(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}

/// Lowercase base-36 rendering of a non-negative integer.
pub fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}
