//! # Turn Policy
//!
//! Selects the system directive that steers the interview toward a
//! graceful close as the conversation grows. Pure function of history
//! length, nothing else.

/// Escalation directive prepended to the system prompt before each
/// dialogue call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Conversation is young, no steering.
    Normal,
    /// Ask the model to start winding the interview down.
    WrapUp,
    /// Tell the model to end the interview now.
    HardStop,
}

impl Directive {
    /// Select the directive for the current history length.
    ///
    /// Up to 4 turns the interview runs normally, 5-6 turns asks for a
    /// graceful close, beyond 6 the interview is declared over.
    pub fn for_history_len(history_len: usize) -> Directive {
        if history_len > 6 {
            Directive::HardStop
        } else if history_len > 4 {
            Directive::WrapUp
        } else {
            Directive::Normal
        }
    }

    /// Text appended to the base system prompt, empty for `Normal`.
    pub fn prompt_suffix(&self) -> &'static str {
        match self {
            Directive::Normal => "",
            Directive::WrapUp => {
                " Try to end the interview gracefully and then summarize the \
                 conversation with a 2 sentence summary. Finally end with a quote \
                 related to this conversation and be sure to cite the author of \
                 the quote."
            }
            Directive::HardStop => {
                " End the interview now saying 'I'm sorry but we are out of time'. \
                 Thank the guest and provide a quote related to this conversation \
                 and be sure to cite the author of the quote."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_boundaries() {
        assert_eq!(Directive::for_history_len(0), Directive::Normal);
        assert_eq!(Directive::for_history_len(4), Directive::Normal);
        assert_eq!(Directive::for_history_len(5), Directive::WrapUp);
        assert_eq!(Directive::for_history_len(6), Directive::WrapUp);
        assert_eq!(Directive::for_history_len(7), Directive::HardStop);
        assert_eq!(Directive::for_history_len(100), Directive::HardStop);
    }

    #[test]
    fn test_directive_is_deterministic() {
        for len in 0..32 {
            assert_eq!(
                Directive::for_history_len(len),
                Directive::for_history_len(len)
            );
        }
    }

    #[test]
    fn test_normal_adds_nothing_to_prompt() {
        assert!(Directive::Normal.prompt_suffix().is_empty());
        assert!(!Directive::WrapUp.prompt_suffix().is_empty());
        assert!(Directive::HardStop.prompt_suffix().contains("out of time"));
    }
}
