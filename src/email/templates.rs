use chrono::{DateTime, Utc};

use super::EmailMessage;
use crate::config::FoundationInfo;
use crate::services::progress_report::ProgramProgress;

const STYLE: &str = "body { font-family: Arial, sans-serif; line-height: 1.6; color: #333; }
      .container { max-width: 600px; margin: 0 auto; padding: 20px; }
      .header { background-color: #0ea5e9; color: white; padding: 20px; text-align: center; }
      .content { padding: 20px; background-color: #f9fafb; }
      .amount { font-size: 24px; font-weight: bold; color: #0ea5e9; }
      .button { display: inline-block; padding: 12px 24px; background-color: #0ea5e9; color: white; text-decoration: none; border-radius: 5px; margin-top: 20px; }
      .footer { text-align: center; padding: 20px; font-size: 12px; color: #666; }";

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Rupee amounts with Indian digit grouping: 1234567 -> "12,34,567".
pub fn format_inr(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::new();
    if digits.len() <= 3 {
        grouped.push_str(&digits);
    } else {
        let (head, tail) = digits.split_at(digits.len() - 3);
        let head_bytes = head.as_bytes();
        for (i, b) in head_bytes.iter().enumerate() {
            if i > 0 && (head_bytes.len() - i) % 2 == 0 {
                grouped.push(',');
            }
            grouped.push(*b as char);
        }
        grouped.push(',');
        grouped.push_str(tail);
    }
    if amount < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

fn page(title_html: &str, body_html: &str, footer_html: &str) -> String {
    format!(
        "<!DOCTYPE html>
<html>
<head><style>
      {style}
</style></head>
<body>
  <div class=\"container\">
    <div class=\"header\">{title}</div>
    <div class=\"content\">{body}</div>
    <div class=\"footer\">{footer}</div>
  </div>
</body>
</html>",
        style = STYLE,
        title = title_html,
        body = body_html,
        footer = footer_html
    )
}

pub struct Confirmation<'a> {
    pub to: &'a str,
    pub donor_name: &'a str,
    pub amount: i64,
    pub program_name: &'a str,
    pub donation_id: &'a str,
    pub certificate_url: &'a str,
    pub date: DateTime<Utc>,
}

pub fn donation_confirmation(data: &Confirmation<'_>, foundation: &FoundationInfo) -> EmailMessage {
    let amount = format_inr(data.amount);
    let program = escape_html(data.program_name);
    let body = format!(
        "<p>Dear {donor},</p>
      <p>We are deeply grateful for your generous donation of <span class=\"amount\">&#8377;{amount}</span> towards <strong>{program}</strong>.</p>
      <p>Your contribution will make a significant impact in helping us achieve our mission.</p>
      <p><strong>Donation Details:</strong></p>
      <ul>
        <li>Donation ID: {id}</li>
        <li>Amount: &#8377;{amount}</li>
        <li>Program: {program}</li>
        <li>Date: {date}</li>
      </ul>
      <p>Your 80G tax exemption certificate has been generated and is available for download.</p>
      <a href=\"{url}\" class=\"button\">Download Certificate</a>
      <p style=\"margin-top: 20px;\">You will receive regular progress reports about how your donation is being utilized.</p>",
        donor = escape_html(data.donor_name),
        amount = amount,
        program = program,
        id = escape_html(data.donation_id),
        date = data.date.format("%d/%m/%Y"),
        url = escape_html(data.certificate_url),
    );
    let footer = format!(
        "<p>{}</p><p>{}</p>",
        escape_html(&foundation.name),
        escape_html(&foundation.address)
    );

    EmailMessage {
        to: data.to.to_string(),
        subject: "Thank You for Your Donation!".to_string(),
        html: page("<h1>Thank You for Your Donation!</h1>", &body, &footer),
    }
}

fn program_block(program: &ProgramProgress) -> String {
    format!(
        "<div style=\"margin-bottom: 25px; padding: 20px; background-color: white; border-left: 4px solid #0ea5e9;\">
        <h3 style=\"margin-top: 0; color: #0ea5e9;\">{name}</h3>
        <p style=\"color: #666; font-size: 14px;\">{description}</p>
        <div style=\"background-color: #e5e7eb; border-radius: 10px; height: 20px; overflow: hidden;\">
          <div style=\"background-color: #0ea5e9; height: 100%; width: {bar:.1}%;\"></div>
        </div>
        <p style=\"text-align: center; font-weight: bold; color: #0ea5e9;\">{progress:.1}% of Target Reached</p>
        <table style=\"width: 100%; border-collapse: collapse; font-size: 14px;\">
          <tr><td>Target Amount:</td><td style=\"text-align: right;\">&#8377;{target}</td></tr>
          <tr><td>Funds Received:</td><td style=\"text-align: right;\">&#8377;{received}</td></tr>
          <tr><td>Funds Utilized:</td><td style=\"text-align: right;\">&#8377;{utilized}</td></tr>
          <tr><td>Remaining to Target:</td><td style=\"text-align: right;\">&#8377;{remaining}</td></tr>
          <tr><td>Utilization Rate:</td><td style=\"text-align: right;\">{utilization:.1}%</td></tr>
          <tr style=\"background-color: #f0f9ff;\"><td><strong>Your Contribution:</strong></td><td style=\"text-align: right;\"><strong>&#8377;{contribution}</strong></td></tr>
        </table>
        <p style=\"font-size: 12px; color: #666;\">Status: <strong>{status}</strong></p>
      </div>",
        name = escape_html(&program.program_name),
        description = escape_html(&program.description),
        bar = program.progress_percentage.min(100.0),
        progress = program.progress_percentage,
        target = format_inr(program.target_amount),
        received = format_inr(program.funds_received),
        utilized = format_inr(program.funds_utilized),
        remaining = format_inr(program.remaining),
        utilization = program.utilization_rate,
        contribution = format_inr(program.donor_contribution),
        status = program.status.as_str().to_uppercase(),
    )
}

pub fn progress_report(
    to: &str,
    donor_name: &str,
    programs: &[ProgramProgress],
    report_date: DateTime<Utc>,
    foundation: &FoundationInfo,
) -> EmailMessage {
    let blocks: String = programs.iter().map(program_block).collect();
    let title = format!(
        "<h1>Progress Report</h1><p style=\"margin: 0; font-size: 14px;\">Report Date: {}</p>",
        report_date.format("%A, %d %B %Y")
    );
    let body = format!(
        "<p>Dear {donor},</p>
      <p>Thank you for your continued support. Here's your structured progress update on the programs you've contributed to:</p>
      {blocks}
      <p style=\"margin-top: 20px;\">Your generosity is making a real difference. Thank you for being part of our mission!</p>",
        donor = escape_html(donor_name),
        blocks = blocks,
    );
    let footer = format!(
        "<p>{}</p><p>To unsubscribe from these updates, please contact us.</p>",
        escape_html(&foundation.name)
    );

    EmailMessage {
        to: to.to_string(),
        subject: "Progress Report - Your Impact".to_string(),
        html: page(&title, &body, &footer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indian_grouping() {
        assert_eq!(format_inr(0), "0");
        assert_eq!(format_inr(500), "500");
        assert_eq!(format_inr(1_000), "1,000");
        assert_eq!(format_inr(123_456), "1,23,456");
        assert_eq!(format_inr(12_345_678), "1,23,45,678");
    }

    #[test]
    fn user_values_are_escaped() {
        let msg = donation_confirmation(
            &Confirmation {
                to: "donor@example.org",
                donor_name: "<script>alert(1)</script>",
                amount: 500,
                program_name: "Clean Water & Sanitation",
                donation_id: "d1",
                certificate_url: "http://localhost:5173/certificates/d1",
                date: Utc::now(),
            },
            &FoundationInfo::default(),
        );
        assert!(!msg.html.contains("<script>"));
        assert!(msg.html.contains("&lt;script&gt;"));
        assert!(msg.html.contains("Clean Water &amp; Sanitation"));
        assert!(msg.html.contains("&#8377;500"));
    }
}
