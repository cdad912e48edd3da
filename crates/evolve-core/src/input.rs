//! Job input and repository naming.

use rand::distributions::Uniform;
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::error::JobError;

/// Number of random letters in a generated repository name.
pub const NAME_SUFFIX_LEN: usize = 7;

/// Access token. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Credential(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            f.write_str("Credential(<empty>)")
        } else {
            f.write_str("Credential(***)")
        }
    }
}

/// The three values a caller hands to a job.
#[derive(Debug, Clone)]
pub struct JobInput {
    config: String,
    credential: Credential,
    repository_name: Option<String>,
}

impl JobInput {
    /// An empty `repository_name` counts as absent; anything else is used verbatim.
    pub fn new(
        config: impl Into<String>,
        credential: impl Into<String>,
        repository_name: Option<String>,
    ) -> Self {
        Self {
            config: config.into(),
            credential: Credential::new(credential),
            repository_name: repository_name.filter(|n| !n.is_empty()),
        }
    }

    pub fn config(&self) -> &str {
        &self.config
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn repository_name(&self) -> Option<&str> {
        self.repository_name.as_deref()
    }

    /// Check the inputs required before anything is touched.
    pub fn validate(&self) -> Result<(), JobError> {
        if self.config.is_empty() {
            return Err(JobError::EmptyConfig);
        }
        if self.credential.is_empty() {
            return Err(JobError::MissingCredential);
        }
        Ok(())
    }

    /// SHA-256 of the configuration text, for correlating logs without the body.
    pub fn config_digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.config.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// `<prefix>-` followed by [`NAME_SUFFIX_LEN`] random lowercase letters.
pub fn generate_repo_name(prefix: &str) -> String {
    generate_repo_name_with(prefix, &mut rand::thread_rng())
}

pub fn generate_repo_name_with<R: Rng + ?Sized>(prefix: &str, rng: &mut R) -> String {
    let letters = Uniform::new_inclusive(b'a', b'z');
    let suffix: String = (0..NAME_SUFFIX_LEN)
        .map(|_| char::from(rng.sample(letters)))
        .collect();
    format!("{prefix}-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn is_generated(name: &str, prefix: &str) -> bool {
        name.strip_prefix(&format!("{prefix}-"))
            .map(|s| s.len() == NAME_SUFFIX_LEN && s.chars().all(|c| c.is_ascii_lowercase()))
            .unwrap_or(false)
    }

    #[test]
    fn test_generated_name_pattern() {
        for _ in 0..100 {
            let name = generate_repo_name("mergekit-evolve");
            assert!(is_generated(&name, "mergekit-evolve"), "bad name {name}");
        }
    }

    #[test]
    fn test_generated_names_differ() {
        let names: HashSet<String> = (0..50).map(|_| generate_repo_name("mergekit-evolve")).collect();
        assert!(names.len() > 45);
    }

    #[test]
    fn test_seeded_generation_is_deterministic() {
        let a = generate_repo_name_with("p", &mut StdRng::seed_from_u64(7));
        let b = generate_repo_name_with("p", &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }

    #[test]
    fn test_validate_order() {
        assert_eq!(
            JobInput::new("", "", None).validate(),
            Err(JobError::EmptyConfig)
        );
        assert_eq!(
            JobInput::new("models: [a,b]", "", None).validate(),
            Err(JobError::MissingCredential)
        );
        assert!(JobInput::new("models: [a,b]", "tok_abc", None).validate().is_ok());
    }

    #[test]
    fn test_empty_name_is_absent() {
        assert_eq!(JobInput::new("c", "t", Some(String::new())).repository_name(), None);
        assert_eq!(
            JobInput::new("c", "t", Some("my-merge".into())).repository_name(),
            Some("my-merge")
        );
    }

    #[test]
    fn test_name_kept_verbatim() {
        assert_eq!(
            JobInput::new("c", "t", Some(" my-merge ".into())).repository_name(),
            Some(" my-merge ")
        );
    }

    #[test]
    fn test_whitespace_credential_is_present() {
        assert!(JobInput::new("models: [a,b]", "  ", None).validate().is_ok());
        assert_eq!(
            JobInput::new("models: [a,b]", "", None).validate(),
            Err(JobError::MissingCredential)
        );
    }

    #[test]
    fn test_debug_hides_credential() {
        let input = JobInput::new("c", "hf_supersecret", None);
        let printed = format!("{input:?}");
        assert!(!printed.contains("supersecret"));
        assert!(printed.contains("***"));
    }

    #[test]
    fn test_config_digest_stable() {
        let a = JobInput::new("models: [a,b]", "t", None);
        let b = JobInput::new("models: [a,b]", "other", None);
        assert_eq!(a.config_digest(), b.config_digest());
        assert_eq!(a.config_digest().len(), 64);
    }
}
