use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Defines different styles for text elements.
pub enum StyleType {
    Title,
    TotalLabel,
    TotalValue,
    Pending,
    Error,
    Subtle,
}

/// Applies a consistent style to a string.
pub fn style_text(text: &str, style_type: StyleType) -> String {
    let styled = match style_type {
        StyleType::Title => style(text).bold().underlined(),
        StyleType::TotalLabel => style(text).bold(),
        StyleType::TotalValue => style(text).green().bold(),
        StyleType::Pending => style(text).yellow().italic(),
        StyleType::Error => style(text).red(),
        StyleType::Subtle => style(text).dim(),
    };
    styled.to_string()
}

/// Creates a new `comfy_table::Table` with standard styling.
pub fn new_styled_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Creates a styled header cell for a table.
pub fn header_cell(text: &str) -> Cell {
    Cell::new(text)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

/// Formats an `Option<T>` into a `Cell`. `None` is shown as a placeholder,
/// red when the value is missing because of an error.
pub fn format_optional_cell<T>(
    value: Option<T>,
    has_error: bool,
    format_fn: impl Fn(T) -> String,
) -> Cell {
    value.map_or_else(
        || placeholder_cell(has_error),
        |v| Cell::new(format_fn(v)).set_alignment(CellAlignment::Right),
    )
}

pub fn placeholder_cell(has_error: bool) -> Cell {
    let color = if has_error {
        Color::Red
    } else {
        Color::DarkGrey
    };
    Cell::new("…")
        .fg(color)
        .set_alignment(CellAlignment::Right)
}

/// Creates a new `indicatif::ProgressBar` with standard styling.
pub fn new_progress_bar(len: u64, with_message: bool) -> ProgressBar {
    let template = if with_message {
        "{spinner:.green} {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}"
    } else {
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}"
    };

    let pb = ProgressBar::new(len);
    if let Ok(bar_style) = ProgressStyle::default_bar().template(template) {
        pb.set_style(bar_style.progress_chars("#>-"));
    }
    pb
}

fn term_width() -> usize {
    console::Term::stdout()
        .size_checked()
        .map(|(_, w)| w as usize)
        .unwrap_or(80)
}

/// Prints a separator line matching the terminal width.
pub fn print_separator() {
    println!("\n{}", "─".repeat(term_width()));
}

/// Prints a right-aligned grand total under a double rule.
pub fn print_grand_total(label: &str, value: &str) {
    let width = term_width();
    println!("\n{}", "=".repeat(width));
    let total_str = format!("{label}: {value}");
    let styled_total = style(&total_str).bold().green();
    println!("{styled_total:>width$}");
}
