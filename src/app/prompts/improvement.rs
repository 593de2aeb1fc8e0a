//! Improvement prompt
//!
//! Used when an artifact is displayed and the user asks for a change. The generator sees the
//! full previous document and every request made so far, and must answer with a complete
//! replacement.

#![warn(clippy::all, rust_2018_idioms)]

/// Template for improving the current visualization
///
/// Placeholders: `{{API_DESCRIPTION}}`, `{{PREVIOUS_ARTIFACT}}`, `{{REQUEST_HISTORY}}`,
/// `{{LATEST_REQUEST}}`, `{{DATA_ACCESS_RULES}}`, `{{OUTPUT_RULES}}`.
pub const IMPROVEMENT_PROMPT: &str = r#"You are an expert front-end developer who builds interactive data visualizations.

You previously created the HTML document below. The user now wants it changed.

## API Description

{{API_DESCRIPTION}}

## Current Visualization

{{PREVIOUS_ARTIFACT}}

## Conversation So Far

Every request the user has made for this visualization, oldest first:

{{REQUEST_HISTORY}}

## Latest Request

{{LATEST_REQUEST}}

## Your Task

Return the COMPLETE updated HTML document - not a diff, not a fragment. Apply the latest
request while keeping everything the earlier requests asked for, unless the latest request
explicitly changes it.

{{DATA_ACCESS_RULES}}

{{OUTPUT_RULES}}
"#;
