use archkit::TargetStatus;
use colored::{ColoredString, Colorize};

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Colored status symbol of a target
pub fn status_symbol(status: TargetStatus) -> ColoredString {
    let symbol = status.symbol();
    match status {
        TargetStatus::Unchanged => symbol.dimmed(),
        TargetStatus::Fresh => symbol.green().bold(),
        TargetStatus::Failed => symbol.red().bold(),
        TargetStatus::Pending => symbol.yellow(),
    }
}

/// Indent every line of captured command output
pub fn indent(text: &str, prefix: &str) -> String {
    text.lines()
        .map(|line| format!("{prefix}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}
