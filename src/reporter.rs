use crate::notify::DispatchSummary;
use crate::types::Alert;

/// Emit an alert as a single JSON line to stdout.
pub fn report_alert(alert: &Alert) {
    if let Ok(json) = serde_json::to_string(alert) {
        println!("{json}");
    }
}

/// Emit a cycle summary as a single JSON line to stdout.
pub fn report_cycle(wallets: usize, alerts: usize, summary: &DispatchSummary) {
    let line = serde_json::json!({
        "type": "cycle",
        "wallets": wallets,
        "alerts": alerts,
        "sent": summary.sent,
        "failed": summary.failed,
    });
    println!("{line}");
}
