use super::ui;
use crate::core::aggregator::{AggregationHandle, Snapshot};
use crate::core::aggregate::token_units;
use crate::core::usd::format_usd;
use crate::core::{AggregateState, Aggregator, AssetRegistry, Context};
use anyhow::Result;
use comfy_table::Cell;
use indicatif::ProgressBar;
use rust_decimal::Decimal;
use std::time::Duration;

impl Snapshot {
    pub fn display_as_table(&self, title: &str, registry: &AssetRegistry) -> String {
        let mut table = ui::new_styled_table();

        table.set_header(vec![
            ui::header_cell("Asset"),
            ui::header_cell("Balance"),
            ui::header_cell("Price (USD)"),
            ui::header_cell("Value (USD)"),
            ui::header_cell("Weight (%)"),
        ]);

        let total = self.state.total();
        for entry in &self.entries {
            let arn = entry.entry.arn;
            let asset = registry
                .symbol(&arn)
                .map_or_else(|| arn.short(), |s| s.to_string());
            let has_error = entry.error.is_some();

            let amount = entry
                .decimals
                .and_then(|d| token_units(entry.entry.balance, d));
            let weight = match (entry.value, total) {
                (Some(value), Some(total)) if total > Decimal::ZERO => value
                    .checked_div(total)
                    .and_then(|w| w.checked_mul(Decimal::ONE_HUNDRED)),
                _ => None,
            };

            table.add_row(vec![
                Cell::new(asset),
                ui::format_optional_cell(amount, has_error, |a| a.to_string()),
                ui::format_optional_cell(entry.price, has_error, |p| p.to_string()),
                ui::format_optional_cell(entry.value, has_error, format_usd),
                ui::format_optional_cell(weight, false, |w| format!("{w:.2}%")),
            ]);
        }

        let total_text = match &self.state {
            AggregateState::Pending => ui::style_text(
                &format!(
                    "pending ({}/{} prices)",
                    self.progress.resolved, self.progress.total
                ),
                ui::StyleType::Pending,
            ),
            state => ui::style_text(&state.to_string(), ui::StyleType::TotalValue),
        };

        let mut output = format!("{}\n\n", ui::style_text(title, ui::StyleType::Title));

        if self.entries.is_empty() {
            output.push_str(&ui::style_text("No assets held", ui::StyleType::Subtle));
        } else {
            output.push_str(&table.to_string());
        }

        output.push_str(&format!(
            "\n\n{}: {}",
            ui::style_text("Total Value (USD)", ui::StyleType::TotalLabel),
            total_text
        ));

        for entry in self.entries.iter().filter(|e| e.error.is_some()) {
            let asset = registry
                .symbol(&entry.entry.arn)
                .map_or_else(|| entry.entry.arn.to_string(), |s| s.to_string());
            output.push_str(&format!(
                "\n{}",
                ui::style_text(
                    &format!("{asset}: {}", entry.error.as_deref().unwrap_or_default()),
                    ui::StyleType::Error
                )
            ));
        }

        output
    }
}

/// Mirrors aggregation progress on `pb` until the total settles or `timeout` passes.
pub(crate) async fn follow(
    handle: &mut AggregationHandle,
    pb: &ProgressBar,
    timeout: Option<Duration>,
) -> Snapshot {
    let tracking = async {
        loop {
            let progress = handle.progress();
            pb.set_length(progress.total as u64);
            pb.set_position((progress.resolved + progress.failed) as u64);
            if !handle.state().is_pending() || progress.done {
                break;
            }
            if !handle.changed().await {
                break;
            }
        }
    };
    match timeout {
        Some(limit) => {
            let _ = tokio::time::timeout(limit, tracking).await;
        }
        None => tracking.await,
    }
    handle.snapshot()
}

pub async fn run(
    aggregator: &Aggregator,
    context: Context,
    title: &str,
    timeout: Option<Duration>,
) -> Result<()> {
    let mut handle = aggregator.watch(context);

    let pb = ui::new_progress_bar(0, true);
    pb.set_message(format!("Pricing {context}..."));
    let snapshot = follow(&mut handle, &pb, timeout).await;
    pb.finish_and_clear();

    if snapshot.state.is_pending() {
        handle.cancel();
    }
    println!("{}", snapshot.display_as_table(title, aggregator.registry()));
    Ok(())
}
