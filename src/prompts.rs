//! Prompt construction for listing analysis and batch ranking
//!
//! Both builders are pure: identical inputs always yield identical text,
//! and missing listing fields degrade to the `Unknown` placeholder.

use crate::models::{display_value, Criteria, Details, Listing, UNKNOWN};
use std::fmt::Write;

/// Keys already printed as core fields in a ranking block
const CORE_FIELDS: &[&str] = &["year", "make", "model", "price"];

const ANALYSIS_INSTRUCTIONS: &str = r#"
Please provide a concise analysis of this vehicle covering:
1. Value assessment (is this price reasonable for this vehicle?)
2. Potential concerns or red flags based on the listing
3. Key benefits of this vehicle
4. Overall recommendation (avoid, consider, or recommended)

Keep your analysis brief but insightful, focusing on the most important factors a buyer should consider.
"#;

const RANKING_PREAMBLE: &str = r#"
You are a pre-owned car buying expert. Analyze and rank the following vehicles based on value, reliability, and overall quality.
"#;

const RANKING_INSTRUCTIONS: &str = r#"
Please rank these vehicles from best to worst overall value, considering:
1. Price relative to market value
2. Expected reliability and maintenance costs
3. Alignment with user preferences
4. Overall condition and potential issues

For each of your top 3 recommendations, provide a brief justification (1-2 sentences).
For the remaining vehicles, simply list them in ranked order.
"#;

/// Build the single-listing analysis prompt
pub fn build_analysis_prompt(listing: &Listing, preferences: &Criteria) -> String {
    let source = if listing.source.is_empty() {
        UNKNOWN
    } else {
        listing.source.as_str()
    };

    let mut prompt = String::from(
        "\nAnalyze the following pre-owned car listing and provide your professional assessment:\n\nCAR DETAILS:\n",
    );
    push_core_fields(&mut prompt, listing);
    push_line(&mut prompt, "Source", source);

    if !listing.details.is_empty() {
        prompt.push_str("\nADDITIONAL DETAILS:\n");
        push_details(&mut prompt, &listing.details, |_| true);
    }

    push_preferences(&mut prompt, preferences);

    prompt.push_str(ANALYSIS_INSTRUCTIONS);
    prompt
}

/// Build the batch ranking prompt; listings are numbered from 1
pub fn build_ranking_prompt(listings: &[Listing], preferences: &Criteria) -> String {
    let mut prompt = String::from(RANKING_PREAMBLE);

    push_preferences(&mut prompt, preferences);

    prompt.push_str("\nCAR LISTINGS:\n");

    for (i, listing) in listings.iter().enumerate() {
        let _ = write!(prompt, "\nCAR {}:\n", i + 1);
        push_core_fields(&mut prompt, listing);
        push_details(&mut prompt, &listing.details, |key| !CORE_FIELDS.contains(&key));
    }

    prompt.push_str(RANKING_INSTRUCTIONS);
    prompt
}

/// `fuel_type` -> `Fuel Type`
pub fn format_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut prev_is_alpha = false;

    for c in key.replace('_', " ").chars() {
        if c.is_alphabetic() {
            if prev_is_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_is_alpha = true;
        } else {
            out.push(c);
            prev_is_alpha = false;
        }
    }

    out
}

fn push_core_fields(prompt: &mut String, listing: &Listing) {
    push_line(prompt, "Year", &listing.year_or_unknown());
    push_line(prompt, "Make", listing.make_or_unknown());
    push_line(prompt, "Model", listing.model_or_unknown());
    push_line(prompt, "Price", &format!("${}", listing.price_or_unknown()));
}

fn push_details(prompt: &mut String, details: &Details, include: impl Fn(&str) -> bool) {
    for (key, value) in details.iter().filter(|(k, _)| include(k)) {
        push_line(prompt, &format_key(key), &display_value(value));
    }
}

fn push_preferences(prompt: &mut String, preferences: &Criteria) {
    if preferences.is_empty() {
        return;
    }

    prompt.push_str("\nUSER PREFERENCES:\n");
    for (key, value) in preferences.iter() {
        push_line(prompt, &format_key(key), &display_value(value));
    }
}

fn push_line(prompt: &mut String, label: &str, value: &str) {
    let _ = writeln!(prompt, "- {}: {}", label, value);
}
