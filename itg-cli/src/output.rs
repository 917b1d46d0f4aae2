use itg_collect::drafts::Draft;
use itg_collect::{Entry, PendingSubmission, PlaceSuggestion, Toast, ToastKind};
use time::macros::format_description;
use time::OffsetDateTime;

fn format_date(date: Option<OffsetDateTime>) -> String {
    date.and_then(|d| d.format(format_description!("[year]-[month]-[day]")).ok())
        .unwrap_or_else(|| "-".to_string())
}

fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let mut out: String = value.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

pub fn print_entries(entries: &[Entry]) {
    if entries.is_empty() {
        println!("No entries found.");
        return;
    }

    println!(
        "{:<12} {:<32} {:<16} {:>9} {:<10}",
        "ID", "NAME", "CATEGORY", "DIST", "ADDED"
    );
    for entry in entries {
        let distance = entry
            .distance
            .map(|km| format!("{km:.2} km"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<12} {:<32} {:<16} {:>9} {:<10}",
            truncate(&entry.id, 12),
            truncate(&entry.name, 32),
            truncate(&entry.category, 16),
            distance,
            format_date(entry.created_at),
        );
    }
    println!("\n{} entries", entries.len());
}

pub fn print_pending(pending: &[PendingSubmission]) {
    if pending.is_empty() {
        println!("Nothing waiting to sync.");
        return;
    }

    for submission in pending {
        let queued_at = OffsetDateTime::from_unix_timestamp_nanos(
            i128::from(submission.created_at) * 1_000_000,
        )
        .ok();
        println!(
            "{}  {}  ({:.5}, {:.5})  queued {}",
            submission.id,
            submission.payload.name,
            submission.payload.lat,
            submission.payload.lng,
            format_date(queued_at),
        );
    }
}

pub fn print_drafts(drafts: &[Draft]) {
    if drafts.is_empty() {
        println!("No saved drafts.");
        return;
    }

    for draft in drafts {
        let name = if draft.name.is_empty() {
            "(untitled)"
        } else {
            &draft.name
        };
        println!(
            "{}  {}  step {}  created {}",
            draft.draft_id,
            name,
            draft.current_screen,
            format_date(Some(draft.created_at)),
        );
    }
}

pub fn print_suggestions(suggestions: &[PlaceSuggestion]) {
    if suggestions.is_empty() {
        println!("No nearby places found.");
        return;
    }

    for place in suggestions {
        match &place.vicinity {
            Some(vicinity) => println!("{}  ({vicinity})", place.name),
            None => println!("{}", place.name),
        }
    }
}

pub fn print_toasts(toasts: &[Toast]) {
    for toast in toasts {
        match toast.kind {
            ToastKind::Error => eprintln!("{}", toast.message),
            ToastKind::Success | ToastKind::Info => println!("{}", toast.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_long_values_by_chars() {
        assert_eq!(truncate("Café", 10), "Café");
        assert_eq!(truncate("Corner Cafe Deluxe", 8), "Corner …");
    }

    #[test]
    fn missing_date_prints_dash() {
        assert_eq!(format_date(None), "-");
        assert_eq!(
            format_date(Some(time::macros::datetime!(2024-06-01 12:00 UTC))),
            "2024-06-01"
        );
    }
}
