//! Reads HTML from stdin and prints the extracted heading sections as JSON.
//!
//! Usage: `extract_sections [SOURCE_URL] < page.html`

use heading_harvest::{extract_sections, SectionRecord};
use serde::Serialize;
use std::io::{self, Read};

const DEFAULT_SOURCE_URL: &str = "https://example.com/";

#[derive(Serialize)]
struct Output {
    source_url: String,
    sections: Vec<SectionRecord>,
    warnings: Vec<String>,
}

fn main() {
    env_logger::init();

    let source_url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string());

    let mut html = String::new();
    if io::stdin().read_to_string(&mut html).is_err() {
        eprintln!("Failed to read from stdin");
        std::process::exit(1);
    }

    let output = match extract_sections(&html, &source_url) {
        Ok(extraction) => Output {
            source_url,
            sections: extraction.sections.iter().map(|s| s.to_record()).collect(),
            warnings: extraction.warnings,
        },
        Err(err) => {
            eprintln!("Extraction failed: {err}");
            std::process::exit(1);
        }
    };

    println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
}
