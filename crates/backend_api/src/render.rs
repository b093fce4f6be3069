use chrono_tz::Tz;
use html_escape::encode_text;
use presence::{format_amount, Snapshot};

/// Builds the public status page.
pub fn render_page(snapshot: &Snapshot, tz: Tz) -> String {
    let presentation = &snapshot.presentation;
    let (description, amount, time) = match &snapshot.transaction {
        Some(tx) => (
            tx.description.clone(),
            format_amount(tx.amount),
            tx.created_at
                .with_timezone(&tz)
                .format("%a, %d %b %Y %H:%M:%S %Z")
                .to_string(),
        ),
        None => (String::new(), String::new(), String::new()),
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>In the office?</title>
</head>
<body>
<main>
<h1 class="presence presence-{presence}">{presence}</h1>
<p class="reason">{reason}</p>
<section class="transaction">
<p>Last coffee: <span class="description">{description}</span></p>
<p>Amount: <span class="amount">{amount}</span></p>
<p>Time: <span class="time">{time}</span></p>
</section>
</main>
</body>
</html>
"#,
        presence = presentation.presence,
        reason = encode_text(&presentation.reason),
        description = encode_text(&description),
        amount = encode_text(&amount),
        time = encode_text(&time),
    )
}
