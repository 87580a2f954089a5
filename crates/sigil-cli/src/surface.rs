//! Terminal trust prompt.

use std::io::IsTerminal;

use sigil_approval::{Decision, TrustDecisionSurface};
use sigil_trust::VerifyVerdict;
use tracing::{debug, warn};

use crate::theme::Theme;

/// Asks on the terminal whether to run a package.
///
/// Without an interactive terminal every prompt is answered with
/// [`Decision::Cancel`].
pub(crate) struct TerminalSurface {
    before_prompt: Box<dyn FnMut() + Send>,
}

impl TerminalSurface {
    /// `before_prompt` runs before anything is printed, so progress output
    /// can be cleared first.
    pub(crate) fn new(before_prompt: impl FnMut() + Send + 'static) -> Self {
        Self {
            before_prompt: Box::new(before_prompt),
        }
    }
}

/// Box contents describing a package's trust state.
pub(crate) fn prompt_body(verdict: VerifyVerdict, signer_name: &str) -> String {
    let signer = if signer_name.is_empty() {
        "(none)"
    } else {
        signer_name
    };
    format!(
        "{}\n{}\n\nThis package is {}.",
        Theme::kv("Signer", signer),
        Theme::kv("Verdict", &Theme::verdict(verdict)),
        verdict.describe(),
    )
}

impl TrustDecisionSurface for TerminalSurface {
    fn present(&mut self, verdict: VerifyVerdict, signer_name: &str) -> Decision {
        (self.before_prompt)();

        if !std::io::stdin().is_terminal() {
            warn!(
                verdict = %verdict,
                signer = signer_name,
                "no terminal to ask on; cancelling launch"
            );
            eprintln!(
                "{}",
                Theme::warning("Launch needs approval but no terminal is attached.")
            );
            return Decision::Cancel;
        }

        eprintln!();
        eprintln!(
            "{}",
            Theme::trust_box("Run this package?", &prompt_body(verdict, signer_name), verdict)
        );

        let approved = dialoguer::Confirm::new()
            .with_prompt("Trust this signer and run the package?")
            .default(false)
            .interact()
            .unwrap_or(false);

        if approved {
            Decision::Approve
        } else {
            Decision::Cancel
        }
    }

    fn dismiss(&mut self) {
        // Prompts are modal; nothing can be pending by the time this runs.
        debug!("trust prompt dismissed");
    }
}
