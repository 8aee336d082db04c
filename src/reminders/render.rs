//! Notification and summary rendering.
//!
//! Bodies use Markdown emphasis. User-supplied text is escaped with
//! [`escape_markdown`] before it is interpolated.

use crate::channels::{Control, ControlLayout, OutboundMessage};
use crate::model::{DoseStatus, PendingEdit};
use crate::reminders::token::ActionToken;
use chrono::Duration;

const HEADER: &str = "🕒 Medication reminder:";
const SELECTED_MARK: &str = " ✅";

/// Render the consolidated notification for `entries`.
///
/// One line per entry, two status controls per entry and a final confirm
/// control. The control matching an entry's current status is marked.
pub fn render_reminder(entries: &[PendingEdit], delay: Duration) -> OutboundMessage {
    let delay_label = format!("⏰ Delay {}", short_duration(delay));
    let mut body = format!("{HEADER}\n\n");
    let mut controls = ControlLayout::default();

    for (position, entry) in entries.iter().enumerate() {
        body.push_str(&format!(
            "*{}. Dose {}:* {} — *{}*\n",
            position + 1,
            entry.dose_number,
            escape_markdown(&entry.medication_name),
            entry.status
        ));

        controls.push_row(vec![
            status_control(entry, DoseStatus::Taken, "✅ Taken"),
            status_control(entry, DoseStatus::Delayed, &delay_label),
        ]);
    }

    controls.push_row(vec![Control::new(
        "✅ Confirm changes",
        ActionToken::Confirm.encode(),
    )]);

    OutboundMessage::with_controls(body, controls)
}

/// Backslash-escape the Markdown control characters in `text`.
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '*' | '_' | '`' | '[' | ']') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Yes/no prompt offered after a confirm.
pub fn render_weight_prompt() -> OutboundMessage {
    let mut controls = ControlLayout::default();
    controls.push_row(vec![
        Control::new("Yes", ActionToken::WeightUpdate { accept: true }.encode()),
        Control::new("No", ActionToken::WeightUpdate { accept: false }.encode()),
    ]);
    OutboundMessage::with_controls("Would you like to update your weight?", controls)
}

/// `3h`, `90m`.
fn short_duration(delay: Duration) -> String {
    let minutes = delay.num_minutes();
    if minutes % 60 == 0 {
        format!("{}h", minutes / 60)
    } else {
        format!("{minutes}m")
    }
}

fn status_control(entry: &PendingEdit, status: DoseStatus, label: &str) -> Control {
    let label = if entry.status == status {
        format!("{label}{SELECTED_MARK}")
    } else {
        label.to_owned()
    };
    Control::new(label, ActionToken::set_status(entry.key(), status).encode())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::model::{DoseKey, MedicationKind};

    #[test]
    fn lists_every_entry_with_its_status() {
        let mut delayed = PendingEdit::unset(DoseKey::new(MedicationKind::Pen, 0, 2), "Insulin");
        delayed.status = DoseStatus::Delayed;
        let entries = vec![
            PendingEdit::unset(DoseKey::new(MedicationKind::Tablet, 1, 1), "Aspirin"),
            delayed,
        ];

        let message = render_reminder(&entries, Duration::hours(3));
        assert!(message.body.contains("*1. Dose 1:* Aspirin — *not selected*"));
        assert!(message.body.contains("*2. Dose 2:* Insulin — *delayed*"));
        assert_eq!(message.controls.rows.len(), 3);
    }

    #[test]
    fn marks_selected_control_and_encodes_tokens() {
        let mut entry = PendingEdit::unset(DoseKey::new(MedicationKind::Bottle, 0, 3), "Drops");
        entry.status = DoseStatus::Taken;

        let message = render_reminder(&[entry], Duration::hours(3));
        let row = &message.controls.rows[0];
        assert_eq!(row[0].label, "✅ Taken ✅");
        assert_eq!(row[0].token, "status_bottle_0_3_taken");
        assert_eq!(row[1].label, "⏰ Delay 3h");
        assert_eq!(row[1].token, "status_bottle_0_3_delay");
        assert_eq!(message.controls.rows[1][0].token, "confirm_changes");
    }

    #[test]
    fn delay_label_follows_configured_window() {
        let entry = PendingEdit::unset(DoseKey::new(MedicationKind::Tablet, 0, 1), "A");
        let message = render_reminder(&[entry], Duration::minutes(90));
        assert_eq!(message.controls.rows[0][1].label, "⏰ Delay 90m");
    }

    #[test]
    fn medication_names_cannot_break_emphasis() {
        let entry = PendingEdit::unset(
            DoseKey::new(MedicationKind::Tablet, 0, 1),
            "Vit*D_3 [x]",
        );
        let message = render_reminder(&[entry], Duration::hours(3));
        assert!(message.body.contains(r"*1. Dose 1:* Vit\*D\_3 \[x\] — *not selected*"));
    }

    #[test]
    fn escape_leaves_plain_text_alone() {
        assert_eq!(escape_markdown("Aspirin 500 mg"), "Aspirin 500 mg");
        assert_eq!(escape_markdown(r"a\b`c"), r"a\\b\`c");
    }

    #[test]
    fn weight_prompt_offers_both_answers() {
        let message = render_weight_prompt();
        let tokens: Vec<_> = message.controls.iter().map(|c| c.token.as_str()).collect();
        assert_eq!(tokens, vec!["weight_update_yes", "weight_update_no"]);
    }
}
