use super::balance::follow;
use super::ui;
use crate::core::Aggregator;
use crate::core::config::SavedContext;
use crate::core::usd::format_usd;
use anyhow::{Result, bail};
use futures::future::join_all;
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::debug;

/// Values every saved context concurrently and prints them with a grand total.
pub async fn run(
    aggregator: &Aggregator,
    contexts: &[SavedContext],
    timeout: Option<Duration>,
) -> Result<()> {
    if contexts.is_empty() {
        bail!("No contexts configured. Add a `contexts:` section to the config file.");
    }

    let pb = ui::new_progress_bar(contexts.len() as u64, true);
    pb.set_message("Valuing contexts...");

    let report_futures = contexts.iter().map(|saved| {
        let pb_clone = pb.clone();
        let mut handle = aggregator.detached(saved.context());
        async move {
            let quiet = indicatif::ProgressBar::hidden();
            let snapshot = follow(&mut handle, &quiet, timeout).await;
            if snapshot.state.is_pending() {
                handle.cancel();
            }
            pb_clone.inc(1);
            (saved, snapshot)
        }
    });

    let reports = join_all(report_futures).await;
    pb.finish_and_clear();

    let mut grand_total = Decimal::ZERO;
    let mut all_final = true;
    for (saved, snapshot) in &reports {
        match snapshot.state.total() {
            Some(total) => grand_total += total,
            None => {
                debug!("Context {} has no final total", saved.name);
                all_final = false;
            }
        }
    }

    let num_reports = reports.len();
    for (i, (saved, snapshot)) in reports.iter().enumerate() {
        let title = format!("{} ({})", saved.name, saved.context());
        println!(
            "{}",
            snapshot.display_as_table(&title, aggregator.registry())
        );
        if i < num_reports - 1 {
            ui::print_separator();
        }
    }

    if all_final && num_reports > 1 {
        ui::print_grand_total("Grand Total (USD)", &format_usd(grand_total));
    }

    Ok(())
}
