//! Password prompt responder.
//!
//! State machine over decoded terminal chunks:
//! `AwaitingPrompt -> CredentialSent -> Confirmed | Failed`.
//! Every chunk that looks like a prompt gets exactly one credential write
//! until `max_unconfirmed_prompts` consecutive prompts go unconfirmed.

use nexus_deploy_core::{AuthFailure, AuthState, Credential, SessionSettings};

/// What the driver should do with the chunk it just relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// Nothing to send.
    Ignore,
    /// Write the credential followed by a newline.
    SendCredential,
    /// Stop answering and tear the session down.
    Abort(AuthFailure),
}

/// Decides when to write the credential.
#[derive(Debug)]
pub struct PromptResponder {
    prompt_markers: Vec<String>,
    prompt_suffixes: Vec<String>,
    rejection_markers: Vec<String>,
    max_unconfirmed: u32,
    credential: Credential,
    state: AuthState,
    writes: u32,
}

impl PromptResponder {
    /// Create a responder. The credential is only used to recognise its own
    /// echo, which never counts as confirmation.
    #[must_use]
    pub fn new(settings: &SessionSettings, credential: Credential) -> Self {
        Self {
            prompt_markers: settings.prompt_markers.clone(),
            prompt_suffixes: settings.prompt_suffixes.clone(),
            rejection_markers: settings.rejection_markers.clone(),
            max_unconfirmed: settings.max_unconfirmed_prompts,
            credential,
            state: AuthState::AwaitingPrompt,
            writes: 0,
        }
    }

    #[must_use]
    pub const fn state(&self) -> AuthState {
        self.state
    }

    /// Number of credential writes requested so far.
    #[must_use]
    pub const fn writes(&self) -> u32 {
        self.writes
    }

    /// Whether `text` carries a password prompt signature.
    #[must_use]
    pub fn is_prompt(&self, text: &str) -> bool {
        let trimmed = text.trim_end();
        self.prompt_markers.iter().any(|m| text.contains(m.as_str()))
            || self.prompt_suffixes.iter().any(|s| trimmed.ends_with(s.as_str()))
    }

    fn is_rejection(&self, text: &str) -> bool {
        self.rejection_markers.iter().any(|m| text.contains(m.as_str()))
    }

    fn confirms(&self, text: &str) -> bool {
        let secret = self.credential.expose();
        if secret.is_empty() {
            return !text.trim().is_empty();
        }
        !text.replace(secret, "").trim().is_empty()
    }

    fn fail(&mut self, reason: AuthFailure) -> Response {
        self.state = AuthState::Failed { reason };
        Response::Abort(reason)
    }

    /// Feed one decoded chunk.
    pub fn observe(&mut self, text: &str) -> Response {
        if self.state.is_failed() {
            return Response::Ignore;
        }

        // Only an unconfirmed credential can be rejected. Once confirmed, the
        // same words are ordinary command output.
        if matches!(self.state, AuthState::CredentialSent { .. }) && self.is_rejection(text) {
            return self.fail(AuthFailure::Rejected);
        }

        if self.is_prompt(text) {
            let attempts = match self.state {
                AuthState::CredentialSent { attempts } => attempts + 1,
                _ => 1,
            };
            if attempts > self.max_unconfirmed {
                return self.fail(AuthFailure::TooManyPrompts);
            }
            self.state = AuthState::CredentialSent { attempts };
            self.writes += 1;
            return Response::SendCredential;
        }

        if matches!(self.state, AuthState::CredentialSent { .. }) && self.confirms(text) {
            self.state = AuthState::Confirmed;
        }
        Response::Ignore
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn responder() -> PromptResponder {
        PromptResponder::new(&SessionSettings::default(), Credential::new("hunter2"))
    }

    #[test]
    fn test_prompt_signatures() {
        let r = responder();
        assert!(r.is_prompt("Password: "));
        assert!(r.is_prompt("deploy@10.0.0.5's password: "));
        assert!(r.is_prompt("[sudo] password for deploy: "));
        assert!(r.is_prompt("Enter passphrase for user nexus-bundled:"));
        assert!(!r.is_prompt("Starting remote update...\r\n"));
        assert!(!r.is_prompt("payload.tar.gz   100%  2MB\r\n"));
    }

    #[test]
    fn test_one_write_per_matching_chunk() {
        let mut r = responder();
        assert_eq!(r.observe("Welcome\r\n"), Response::Ignore);
        assert_eq!(r.writes(), 0);

        assert_eq!(r.observe("Password: "), Response::SendCredential);
        assert_eq!(r.writes(), 1);
        assert_eq!(r.state(), AuthState::CredentialSent { attempts: 1 });

        assert_eq!(r.observe("\r\n"), Response::Ignore);
        assert_eq!(r.observe("Starting remote update...\r\n"), Response::Ignore);
        assert_eq!(r.state(), AuthState::Confirmed);
        assert_eq!(r.writes(), 1);
    }

    #[test]
    fn test_sudo_prompt_after_login_is_answered() {
        let mut r = responder();
        assert_eq!(r.observe("deploy@host's password: "), Response::SendCredential);
        assert_eq!(r.observe("\r\nStarting remote update...\r\n"), Response::Ignore);
        assert_eq!(
            r.observe("[sudo] password for deploy: "),
            Response::SendCredential
        );
        assert_eq!(r.state(), AuthState::CredentialSent { attempts: 1 });
        assert_eq!(r.writes(), 2);
    }

    #[test]
    fn test_echoed_credential_does_not_confirm() {
        let mut r = responder();
        r.observe("Password: ");
        assert_eq!(r.observe("hunter2\r\n"), Response::Ignore);
        assert_eq!(r.state(), AuthState::CredentialSent { attempts: 1 });
    }

    #[test]
    fn test_rejection_aborts_without_resubmitting() {
        let mut r = responder();
        r.observe("deploy@host's password: ");
        let response = r.observe("Permission denied, please try again.\r\ndeploy@host's password: ");
        assert_eq!(response, Response::Abort(AuthFailure::Rejected));
        assert_eq!(r.writes(), 1);

        assert_eq!(r.observe("Password: "), Response::Ignore);
        assert_eq!(r.writes(), 1);
        assert_eq!(
            r.state(),
            AuthState::Failed {
                reason: AuthFailure::Rejected
            }
        );
    }

    #[test]
    fn test_rejection_text_ignored_before_any_write() {
        let mut r = responder();
        assert_eq!(
            r.observe("cp: cannot stat: Permission denied (os error 13)\r\n"),
            Response::Ignore
        );
        assert_eq!(r.state(), AuthState::AwaitingPrompt);
    }

    #[test]
    fn test_rejection_text_after_confirmation_is_output() {
        let mut r = responder();
        r.observe("deploy@host's password: ");
        r.observe("Starting remote update...\r\n");
        assert_eq!(r.state(), AuthState::Confirmed);

        assert_eq!(
            r.observe("rm: cannot remove '/tmp/x': Permission denied (os error 13)\r\n"),
            Response::Ignore
        );
        assert_eq!(r.state(), AuthState::Confirmed);

        // A later sudo prompt can still be rejected.
        assert_eq!(r.observe("[sudo] password for deploy: "), Response::SendCredential);
        assert_eq!(
            r.observe("Sorry, try again.\r\n"),
            Response::Abort(AuthFailure::Rejected)
        );
    }

    #[test]
    fn test_unconfirmed_prompts_are_capped() {
        let mut r = responder();
        for _ in 0..3 {
            assert_eq!(r.observe("Password: "), Response::SendCredential);
        }
        assert_eq!(
            r.observe("Password: "),
            Response::Abort(AuthFailure::TooManyPrompts)
        );
        assert_eq!(r.writes(), 3);
    }

    #[test]
    fn test_trailing_d_colon_heuristic() {
        let mut r = responder();
        assert_eq!(r.observe("Verification code for ops required:"), Response::SendCredential);
        assert_eq!(r.observe("nothing to see\r\n"), Response::Ignore);
    }
}
