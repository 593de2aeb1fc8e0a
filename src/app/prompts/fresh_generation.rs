//! Fresh-generation prompt
//!
//! Used when there is no artifact to build on.

#![warn(clippy::all, rust_2018_idioms)]

/// Template for a first visualization
///
/// Placeholders: `{{API_DESCRIPTION}}`, `{{USER_REQUEST}}`, `{{DATA_ACCESS_RULES}}`,
/// `{{OUTPUT_RULES}}`.
pub const FRESH_GENERATION_PROMPT: &str = r#"You are an expert front-end developer who builds interactive data visualizations.

Create a single, self-contained, runnable HTML document that fulfills the user's request
using data from the API described below.

## API Description

{{API_DESCRIPTION}}

## User Request

{{USER_REQUEST}}

{{DATA_ACCESS_RULES}}

{{OUTPUT_RULES}}
"#;
