//! Terminal implementations of the session collaborators

use async_trait::async_trait;
use colored::Colorize;
use std::io::{self, BufRead, Write};
use tracing::debug;
use vmdesk_common::{format_rules_timeout, VmDescriptor};
use vmdesk_session::{ConsentChoice, PasswordPrompt, Prompts, Surface};

use crate::output::{print_error, print_info, print_warning};

/// Read one line from stdin without blocking the runtime.
///
/// `None` on end of input.
async fn read_line(prompt: String) -> Option<String> {
    tokio::task::spawn_blocking(move || {
        print!("{}", prompt);
        let _ = io::stdout().flush();
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    })
    .await
    .ok()
    .flatten()
}

pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes" | "agree")
}

/// Interprets an empty answer or end of input as cancel
pub fn password_answer(line: Option<String>) -> PasswordPrompt {
    match line {
        Some(value) if !value.is_empty() => PasswordPrompt::Provided(value),
        _ => PasswordPrompt::Cancelled,
    }
}

#[derive(Debug, Default)]
pub struct TerminalPrompts;

#[async_trait]
impl Prompts for TerminalPrompts {
    async fn request_password(&self, vm: &VmDescriptor) -> PasswordPrompt {
        let prompt = format!("Password for {} (empty to cancel): ", vm.name.bold());
        password_answer(read_line(prompt).await)
    }

    async fn show_rules(&self, vm: &VmDescriptor) -> ConsentChoice {
        println!();
        println!("{}", format!("Rules for {}", vm.name).bold());
        for (i, rule) in vm.rules.iter().enumerate() {
            println!("  {}. {}", i + 1, rule);
        }
        if let Some(prompt) = &vm.prompt {
            println!();
            println!("  {}", prompt.italic());
        }
        if let Some(timeout) = vm.rules_timeout {
            println!(
                "  {}",
                format!("Agreement lasts {}", format_rules_timeout(timeout)).dimmed()
            );
        }

        match read_line("Agree? [y/N] ".to_string()).await {
            Some(answer) if is_yes(&answer) => ConsentChoice::Agreed,
            _ => ConsentChoice::Declined,
        }
    }

    async fn show_blacklist_notice(&self, _vm: &VmDescriptor, message: &str) {
        print_warning(message);
    }
}

#[derive(Debug, Default)]
pub struct TerminalSurface;

impl Surface for TerminalSurface {
    fn catalog_browser_open(&self) -> bool {
        false
    }

    fn integration_marker_present(&self) -> bool {
        false
    }

    fn clear_display(&self) {
        debug!("Display cleared");
    }

    fn show_notice(&self, message: &str) {
        print_warning(message);
    }

    fn show_error_banner(&self, message: &str) {
        print_error(message);
    }

    fn activate_fallback(&self) {
        print_info("Server unreachable. Remote desktop is unavailable until it comes back.");
    }
}
