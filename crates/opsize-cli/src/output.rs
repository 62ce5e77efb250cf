//! Terminal styling helpers shared by the console reporter and prompt.

pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const RED: &str = "\x1b[31m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const CYAN: &str = "\x1b[36m";
pub const RESET: &str = "\x1b[0m";

/// Formats a section header such as `[2/3] segmentation`.
#[must_use]
pub fn section_header(index: usize, total: usize, title: &str) -> String {
    let label = format!("[{}/{total}] {title}", index + 1);
    let rule = "─".repeat(label.chars().count());
    format!("{BOLD}{CYAN}{label}{RESET}\n{DIM}{rule}{RESET}")
}

/// Indents every line of a block by two spaces.
#[must_use]
pub fn indent(block: &str) -> String {
    block
        .lines()
        .map(|line| format!("  {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Formats a failure banner for an operator.
#[must_use]
pub fn failure_banner(operator: &str, detail: &str) -> String {
    format!("{RED}{BOLD}✗ {operator} failed{RESET}: {detail}")
}
