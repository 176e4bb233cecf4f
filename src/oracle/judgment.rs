//! Oracle prompt and response parsing
//!
//! The vision model answers in free text that should contain a JSON object.
//! The first well-formed object is taken; anything else is a hard error.

use serde::Deserialize;

use super::types::{Confidence, OracleError, OracleJudgment, OracleProvider};

/// Instructions sent with every image
pub const SPLIT_PROMPT: &str = r#"You are inspecting a scanned book image.

1. Decide whether the image is a TWO-PAGE SPREAD (two facing pages side by side) or a SINGLE PAGE.
   Signs of a spread: two symmetric text columns or blocks, a vertical binding line or shadow near the middle,
   a wide landscape aspect ratio, two page numbers or two running heads.
   Signs of a single page: one continuous column of text, a portrait aspect ratio, no central seam.

2. If it is a spread, give the vertical split position as an integer from 0 to 1000, where 0 is the left edge,
   1000 is the right edge and 500 is the exact center. The cut must fall in the gutter between the pages and
   must never pass through any letter, word, image or decoration.

Respond with JSON only, in exactly this shape:
{"isTwoPageSpread": true, "splitPosition": 500, "confidence": "high", "reasoning": "short explanation"}

Use "confidence" of "high", "medium" or "low". For a single page, set "splitPosition" to null."#;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawJudgment {
    is_two_page_spread: bool,
    #[serde(default)]
    split_position: Option<f64>,
    confidence: Confidence,
    #[serde(default)]
    reasoning: String,
}

/// Return the first balanced `{...}` span in `text` that parses as a JSON object
pub fn extract_json_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut search_from = 0;

    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        if let Some(end) = balanced_end(&bytes[start..]) {
            let candidate = &text[start..start + end];
            if matches!(
                serde_json::from_str::<serde_json::Value>(candidate),
                Ok(serde_json::Value::Object(_))
            ) {
                return Some(candidate);
            }
        }
        search_from = start + 1;
    }
    None
}

/// Length of the brace-balanced prefix starting at `{`, skipping string contents
fn balanced_end(bytes: &[u8]) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse a raw model answer into a judgment
pub fn parse_judgment(text: &str, provider: OracleProvider) -> Result<OracleJudgment, OracleError> {
    let json = extract_json_object(text).ok_or_else(|| {
        OracleError::MalformedResponse(format!("no JSON object in response: {}", preview(text)))
    })?;

    let raw: RawJudgment = serde_json::from_str(json)
        .map_err(|e| OracleError::MalformedResponse(format!("{}: {}", e, preview(json))))?;

    let split_position = if raw.is_two_page_spread {
        let position = raw.split_position.ok_or_else(|| {
            OracleError::MalformedResponse("spread judgment without splitPosition".to_string())
        })?;
        if !(0.0..=1000.0).contains(&position) {
            return Err(OracleError::MalformedResponse(format!(
                "splitPosition {} outside 0-1000",
                position
            )));
        }
        Some(position.round() as i32)
    } else {
        None
    };

    Ok(OracleJudgment {
        is_two_page_spread: raw.is_two_page_spread,
        split_position,
        confidence: raw.confidence,
        reasoning: raw.reasoning.trim().to_string(),
        provider,
    })
}

fn preview(text: &str) -> String {
    text.chars().take(200).collect()
}
