//! Queue name validation and generation

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;

use crate::error::QueueError;

pub const MIN_QUEUE_NAME_LEN: usize = 3;
pub const MAX_QUEUE_NAME_LEN: usize = 63;

// Letters/digits separated by single hyphens, never leading or trailing.
static QUEUE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").expect("queue name pattern"));

/// Normalize a queue name to lowercase and check it against the naming rules
pub fn normalize_queue_name(name: &str) -> Result<String, QueueError> {
    let normalized = name.to_ascii_lowercase();
    let invalid = |reason: &str| QueueError::InvalidQueueName {
        queue: name.to_string(),
        reason: reason.to_string(),
    };

    if normalized.len() < MIN_QUEUE_NAME_LEN || normalized.len() > MAX_QUEUE_NAME_LEN {
        return Err(invalid("must be between 3 and 63 characters long"));
    }
    if normalized.contains("--") {
        return Err(invalid("consecutive hyphens are not permitted"));
    }
    if !QUEUE_NAME.is_match(&normalized) {
        return Err(invalid(
            "may contain only letters, digits and hyphens, and must start and end with a letter or digit",
        ));
    }

    Ok(normalized)
}

/// Generates unique queue names from a prefix
pub struct NameGenerator {
    rng: Mutex<StdRng>,
}

impl NameGenerator {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic generator for reproducible tests
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// `prefix` followed by 32 lowercase hex characters
    pub fn random_name(&self, prefix: &str) -> String {
        let suffix: u128 = self.rng.lock().gen();
        format!("{prefix}{suffix:032x}")
    }
}

impl Default for NameGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert_eq!(normalize_queue_name("orders01").unwrap(), "orders01");
        assert_eq!(normalize_queue_name("queue-basics-1").unwrap(), "queue-basics-1");
        assert_eq!(normalize_queue_name("abc").unwrap(), "abc");
        assert_eq!(normalize_queue_name(&"a".repeat(63)).unwrap().len(), 63);
    }

    #[test]
    fn test_names_are_lowercased() {
        assert_eq!(normalize_queue_name("Orders01").unwrap(), "orders01");
    }

    #[test]
    fn test_invalid_lengths() {
        assert!(matches!(
            normalize_queue_name("ab"),
            Err(QueueError::InvalidQueueName { .. })
        ));
        assert!(matches!(
            normalize_queue_name(&"a".repeat(64)),
            Err(QueueError::InvalidQueueName { .. })
        ));
    }

    #[test]
    fn test_invalid_characters_and_hyphens() {
        for name in ["-orders", "orders-", "ord--ers", "ord_ers", "ord ers", "ordérs"] {
            assert!(
                matches!(
                    normalize_queue_name(name),
                    Err(QueueError::InvalidQueueName { .. })
                ),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn test_seeded_generator_is_deterministic() {
        let a = NameGenerator::with_seed(7);
        let b = NameGenerator::with_seed(7);
        assert_eq!(a.random_name("queuebasics-"), b.random_name("queuebasics-"));
    }

    #[test]
    fn test_generated_names_are_valid() {
        let generator = NameGenerator::new();
        let name = generator.random_name("queuebasics-");
        assert!(name.starts_with("queuebasics-"));
        assert_eq!(name.len(), "queuebasics-".len() + 32);
        assert_eq!(normalize_queue_name(&name).unwrap(), name);
        assert_ne!(name, generator.random_name("queuebasics-"));
    }
}
