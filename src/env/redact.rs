//! Secret redaction for step output

pub const REDACTED: &str = "[REDACTED]";

/// Replace every occurrence of a secret value in `text`
///
/// Longer secrets are replaced first so a secret that contains another one is
/// not left half-masked. Multi-line secrets are also masked line by line, since
/// tools often echo them one line at a time.
pub fn redact_secrets(text: &str, secrets: &[&str]) -> String {
    let mut candidates: Vec<&str> = Vec::new();
    for &secret in secrets {
        if secret.trim().is_empty() {
            continue;
        }
        candidates.push(secret);
        if secret.contains('\n') {
            candidates.extend(secret.lines().filter(|line| !line.trim().is_empty()));
        }
    }
    candidates.sort_by_key(|candidate| std::cmp::Reverse(candidate.len()));
    candidates.dedup();

    candidates
        .into_iter()
        .fold(text.to_string(), |masked, secret| masked.replace(secret, REDACTED))
}

/// Secrets of one step, applied to every text that leaves the engine
///
/// A disabled mask returns text unchanged.
#[derive(Debug, Clone, Default)]
pub struct SecretMask {
    secrets: Vec<String>,
}

impl SecretMask {
    pub fn new(secrets: &[&str], enabled: bool) -> Self {
        let secrets = if enabled {
            secrets.iter().map(|s| s.to_string()).collect()
        } else {
            Vec::new()
        };
        Self { secrets }
    }

    pub fn apply(&self, text: &str) -> String {
        if self.secrets.is_empty() {
            return text.to_string();
        }
        let secrets: Vec<&str> = self.secrets.iter().map(String::as_str).collect();
        redact_secrets(text, &secrets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_respects_filtering() {
        let text = "echo token=s3cr3tVALUE";
        assert_eq!(
            SecretMask::new(&["s3cr3tVALUE"], true).apply(text),
            "echo token=[REDACTED]"
        );
        assert_eq!(SecretMask::new(&["s3cr3tVALUE"], false).apply(text), text);
    }

    #[test]
    fn test_redacts_values() {
        let text = "API key is secret123 and normal is visible";
        assert_eq!(
            redact_secrets(text, &["secret123"]),
            "API key is [REDACTED] and normal is visible"
        );
    }

    #[test]
    fn test_blank_secrets_are_ignored() {
        assert_eq!(redact_secrets("a b", &["", " "]), "a b");
    }

    #[test]
    fn test_longer_secret_first() {
        let text = "token=abcdef";
        assert_eq!(redact_secrets(text, &["abc", "abcdef"]), "token=[REDACTED]");
    }

    #[test]
    fn test_multiline_secret_lines() {
        let key = "-----BEGIN KEY-----\nMIIEvQ\n-----END KEY-----";
        let text = "line: MIIEvQ";
        assert_eq!(redact_secrets(text, &[key]), "line: [REDACTED]");
    }
}
