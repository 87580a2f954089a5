//! CLI theme and styling.

use colored::Colorize;
use sigil_runtime::InstanceState;
use sigil_trust::VerifyVerdict;

/// Width of boxed prompts, borders included.
const BOX_WIDTH: usize = 64;

/// CLI theme configuration.
pub(crate) struct Theme;

impl Theme {
    /// Format a header.
    pub(crate) fn header(text: &str) -> String {
        format!("{}", text.bold().cyan())
    }

    /// Format a success message.
    pub(crate) fn success(text: &str) -> String {
        format!("{} {}", "✓".green(), text)
    }

    /// Format an error message.
    pub(crate) fn error(text: &str) -> String {
        format!("{} {}", "✗".red(), text.red())
    }

    /// Format a warning message.
    pub(crate) fn warning(text: &str) -> String {
        format!("{} {}", "!".yellow(), text.yellow())
    }

    /// Format an info message.
    pub(crate) fn info(text: &str) -> String {
        format!("{} {}", "i".blue(), text)
    }

    /// Format a dimmed message.
    pub(crate) fn dimmed(text: &str) -> String {
        format!("{}", text.dimmed())
    }

    /// Format a separator line.
    pub(crate) fn separator() -> String {
        "━".repeat(50).dimmed().to_string()
    }

    /// Format a key-value pair.
    pub(crate) fn kv(key: &str, value: &str) -> String {
        format!("{}: {}", key.bold(), value)
    }

    /// Color a verdict by how much trust it carries.
    pub(crate) fn verdict(verdict: VerifyVerdict) -> String {
        let text = verdict.to_string();
        match verdict {
            VerifyVerdict::Verified => text.green().to_string(),
            VerifyVerdict::SelfSigned | VerifyVerdict::Expired => text.yellow().to_string(),
            VerifyVerdict::NoCertificate | VerifyVerdict::Other => text.red().bold().to_string(),
        }
    }

    /// Color an instance state.
    pub(crate) fn state(state: InstanceState) -> String {
        let text = state.to_string();
        match state {
            InstanceState::Running | InstanceState::Stopped => text.green().to_string(),
            InstanceState::Failed => text.red().to_string(),
            InstanceState::AwaitingApproval => text.yellow().to_string(),
            _ => text.cyan().to_string(),
        }
    }

    /// Draw a box around `content`, bordered in the verdict's color.
    pub(crate) fn trust_box(title: &str, content: &str, verdict: VerifyVerdict) -> String {
        let color_fn = match verdict {
            VerifyVerdict::Verified => |s: &str| s.green().to_string(),
            VerifyVerdict::SelfSigned | VerifyVerdict::Expired => |s: &str| s.yellow().to_string(),
            VerifyVerdict::NoCertificate | VerifyVerdict::Other => |s: &str| s.red().to_string(),
        };

        let inner = BOX_WIDTH.saturating_sub(2);
        let top = format!("╭{}╮", "─".repeat(inner));
        let bottom = format!("╰{}╯", "─".repeat(inner));
        let empty = format!("│{:w$}│", "", w = inner);

        let pad_line = |text: &str| -> String {
            let visible = strip_ansi(text).chars().count();
            let padding = BOX_WIDTH.saturating_sub(4).saturating_sub(visible);
            format!("│ {text}{:p$} │", "", p = padding)
        };

        let mut lines = vec![
            color_fn(&top),
            pad_line(&title.bold().to_string()),
            color_fn(&empty),
        ];
        for line in content.lines() {
            lines.push(pad_line(line));
        }
        lines.push(color_fn(&bottom));
        lines.join("\n")
    }
}

/// Strip ANSI escape codes for visible-length calculation.
fn strip_ansi(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut in_escape = false;
    for c in s.chars() {
        if in_escape {
            if c.is_ascii_alphabetic() {
                in_escape = false;
            }
        } else if c == '\x1b' {
            in_escape = true;
        } else {
            result.push(c);
        }
    }
    result
}
