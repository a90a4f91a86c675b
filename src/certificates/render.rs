use chrono::{DateTime, Utc};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use crate::config::FoundationInfo;
use crate::db::models::CertificateType;
use crate::email::templates::format_inr;

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 50.0;

pub struct CertificateContent<'a> {
    pub certificate_type: CertificateType,
    pub donor_name: &'a str,
    pub amount: i64,
    pub program_name: &'a str,
    pub donation_id: &'a str,
    pub payment_id: Option<&'a str>,
    pub donation_date: DateTime<Utc>,
    pub issued_at: DateTime<Utc>,
}

#[derive(Clone, Copy)]
enum Font {
    Regular,
    Bold,
}

#[derive(Clone, Copy)]
enum Align {
    Left,
    Center,
}

/// Top-down line layout over a single A4 page.
struct Page {
    ops: Vec<Operation>,
    cursor: f32,
}

impl Page {
    fn new() -> Self {
        Self {
            ops: Vec::new(),
            cursor: PAGE_HEIGHT - MARGIN,
        }
    }

    fn line(&mut self, text: &str, font: Font, size: f32, align: Align) -> &mut Self {
        let font_name = match font {
            Font::Regular => "F1",
            Font::Bold => "F2",
        };
        self.cursor -= size * 1.2;
        let x = match align {
            Align::Left => MARGIN,
            // Helvetica averages roughly half an em per glyph.
            Align::Center => ((PAGE_WIDTH - text.chars().count() as f32 * size * 0.5) / 2.0).max(MARGIN),
        };
        self.ops.push(Operation::new("BT", vec![]));
        self.ops
            .push(Operation::new("Tf", vec![font_name.into(), Object::Real(size)]));
        self.ops
            .push(Operation::new("Td", vec![Object::Real(x), Object::Real(self.cursor)]));
        self.ops
            .push(Operation::new("Tj", vec![Object::string_literal(win_ansi(text))]));
        self.ops.push(Operation::new("ET", vec![]));
        self
    }

    /// Greedy word wrap at an approximate character budget.
    fn paragraph(&mut self, text: &str, size: f32) -> &mut Self {
        let budget = ((PAGE_WIDTH - 2.0 * MARGIN) / (size * 0.5)) as usize;
        let mut current = String::new();
        for word in text.split_whitespace() {
            if !current.is_empty() && current.len() + 1 + word.len() > budget {
                let line = std::mem::take(&mut current);
                self.line(&line, Font::Regular, size, Align::Left);
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        if !current.is_empty() {
            self.line(&current, Font::Regular, size, Align::Left);
        }
        self
    }

    fn gap(&mut self, points: f32) -> &mut Self {
        self.cursor -= points;
        self
    }
}

/// The standard PDF fonts use WinAnsi; anything outside Latin-1 becomes '?'.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if (c as u32) < 256 { c as u8 } else { b'?' })
        .collect()
}

fn long_date(at: DateTime<Utc>) -> String {
    at.format("%-d %B %Y").to_string()
}

fn header(page: &mut Page, foundation: &FoundationInfo, title: &str, section: &str) {
    page.line(&foundation.name, Font::Bold, 24.0, Align::Center)
        .gap(6.0)
        .line(&foundation.address, Font::Regular, 12.0, Align::Center)
        .line(
            &format!("Registration No: {}", foundation.registration_number),
            Font::Regular,
            10.0,
            Align::Center,
        )
        .gap(14.0)
        .line(title, Font::Bold, 20.0, Align::Center)
        .gap(6.0)
        .line(
            &format!("(Under Section {} of Income Tax Act, 1961)", section),
            Font::Regular,
            14.0,
            Align::Center,
        )
        .gap(28.0);
}

fn body_80g(page: &mut Page, c: &CertificateContent<'_>) {
    page.line("This is to certify that", Font::Regular, 12.0, Align::Left)
        .gap(12.0)
        .line(c.donor_name, Font::Bold, 14.0, Align::Center)
        .gap(12.0)
        .line("has made a generous donation of", Font::Regular, 12.0, Align::Left)
        .gap(6.0)
        .line(&format!("Rs. {}", format_inr(c.amount)), Font::Bold, 16.0, Align::Center)
        .gap(6.0)
        .line(&format!("towards the program: {}", c.program_name), Font::Regular, 12.0, Align::Left)
        .line(&format!("on {}", long_date(c.donation_date)), Font::Regular, 12.0, Align::Left)
        .gap(18.0)
        .line(&format!("Donation ID: {}", c.donation_id), Font::Regular, 10.0, Align::Left)
        .line(
            &format!("Transaction ID: {}", c.payment_id.unwrap_or("N/A")),
            Font::Regular,
            10.0,
            Align::Left,
        )
        .gap(24.0)
        .paragraph(
            "This donation is eligible for tax deduction under Section 80G of the Income Tax Act, 1961.",
            11.0,
        );
}

fn body_12a(page: &mut Page, c: &CertificateContent<'_>) {
    page.paragraph(
        "This is to certify that the following donation has been received by the organization \
         registered under Section 12A of the Income Tax Act, 1961.",
        12.0,
    )
    .gap(18.0)
    .line(&format!("Donor: {}", c.donor_name), Font::Bold, 14.0, Align::Left)
    .gap(6.0)
    .line(&format!("Amount: Rs. {}", format_inr(c.amount)), Font::Bold, 16.0, Align::Left)
    .gap(6.0)
    .line(&format!("Program: {}", c.program_name), Font::Regular, 12.0, Align::Left)
    .line(&format!("Date: {}", long_date(c.donation_date)), Font::Regular, 12.0, Align::Left)
    .gap(6.0)
    .line(&format!("Donation ID: {}", c.donation_id), Font::Regular, 10.0, Align::Left)
    .line(
        &format!("Transaction ID: {}", c.payment_id.unwrap_or("N/A")),
        Font::Regular,
        10.0,
        Align::Left,
    )
    .gap(24.0)
    .paragraph(
        "This organization is registered under Section 12A and the donation is eligible for tax \
         exemption as per applicable provisions.",
        11.0,
    );
}

fn footer(page: &mut Page, foundation: &FoundationInfo, issued_at: DateTime<Utc>) {
    page.gap(36.0)
        .line(
            &format!("Date of Issue: {}", issued_at.format("%d/%m/%Y")),
            Font::Regular,
            10.0,
            Align::Left,
        )
        .gap(24.0)
        .line("Authorized Signatory", Font::Regular, 10.0, Align::Left)
        .line(&foundation.name, Font::Regular, 10.0, Align::Left)
        .gap(24.0)
        .line(
            "This is a computer-generated certificate and does not require a physical signature.",
            Font::Regular,
            8.0,
            Align::Center,
        );
}

/// Renders a one-page A4 certificate and returns the PDF bytes.
pub fn render_certificate(
    content: &CertificateContent<'_>,
    foundation: &FoundationInfo,
) -> Result<Vec<u8>, lopdf::Error> {
    let mut page = Page::new();
    match content.certificate_type {
        CertificateType::EightyG => {
            header(&mut page, foundation, "DONATION CERTIFICATE", "80G");
            body_80g(&mut page, content);
        }
        CertificateType::TwelveA => {
            header(&mut page, foundation, "REGISTRATION CERTIFICATE", "12A");
            body_12a(&mut page, content);
        }
    }
    footer(&mut page, foundation, content.issued_at);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let regular_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular_id,
            "F2" => bold_id,
        },
    });

    let stream = Content { operations: page.ops }.encode()?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, stream));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), Object::Real(PAGE_WIDTH), Object::Real(PAGE_HEIGHT)],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(certificate_type: CertificateType) -> CertificateContent<'static> {
        CertificateContent {
            certificate_type,
            donor_name: "A. Donor",
            amount: 500,
            program_name: "Clean Water",
            donation_id: "d1",
            payment_id: Some("pay_1"),
            donation_date: Utc::now(),
            issued_at: Utc::now(),
        }
    }

    #[test]
    fn renders_both_certificate_types() {
        for kind in CertificateType::ALL {
            let bytes = render_certificate(&content(kind), &FoundationInfo::default()).expect("render");
            assert!(bytes.starts_with(b"%PDF-1.5"));
            let doc = Document::load_mem(&bytes).expect("parse rendered pdf");
            assert_eq!(doc.get_pages().len(), 1);
        }
    }

    #[test]
    fn non_latin_text_is_replaced() {
        assert_eq!(win_ansi("Rs ₹5"), b"Rs ?5".to_vec());
        assert_eq!(win_ansi("café"), vec![b'c', b'a', b'f', 0xE9]);
    }
}
