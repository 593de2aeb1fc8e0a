//! Generation Prompts
//!
//! Two deterministic prompt variants built from static templates:
//! - [`build_fresh_prompt`] when there is no artifact to build on
//! - [`build_improvement_prompt`] when the displayed artifact should be changed
//!
//! Templates are rendered in a single pass, so placeholder-looking text inside a user
//! request, the API description or a previous artifact is never expanded.

#![warn(clippy::all, rust_2018_idioms)]

pub mod common;
pub mod fresh_generation;
pub mod improvement;

pub use common::{DATA_ACCESS_RULES, OUTPUT_RULES};
pub use fresh_generation::FRESH_GENERATION_PROMPT;
pub use improvement::IMPROVEMENT_PROMPT;

use crate::app::session::ConversationContext;

/// Build the prompt for a first visualization
pub fn build_fresh_prompt(user_request: &str, api_description: &str) -> String {
    render_template(
        FRESH_GENERATION_PROMPT,
        &[
            ("API_DESCRIPTION", api_description),
            ("USER_REQUEST", user_request),
            ("DATA_ACCESS_RULES", DATA_ACCESS_RULES),
            ("OUTPUT_RULES", OUTPUT_RULES),
        ],
    )
}

/// Build the prompt that improves the context's current artifact
///
/// The request history lists the original request, every improvement so far and finally
/// `user_request`, one per line.
pub fn build_improvement_prompt(
    user_request: &str,
    api_description: &str,
    context: &ConversationContext,
) -> String {
    let mut requests = context.requests();
    requests.push(user_request);
    let request_history = requests.join("\n");

    render_template(
        IMPROVEMENT_PROMPT,
        &[
            ("API_DESCRIPTION", api_description),
            ("PREVIOUS_ARTIFACT", context.artifact().unwrap_or_default()),
            ("REQUEST_HISTORY", &request_history),
            ("LATEST_REQUEST", user_request),
            ("DATA_ACCESS_RULES", DATA_ACCESS_RULES),
            ("OUTPUT_RULES", OUTPUT_RULES),
        ],
    )
}

/// Replace `{{NAME}}` placeholders of `template` in one left-to-right pass
///
/// Unknown placeholders are kept verbatim.
pub fn render_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(template.len() * 2);
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            output.push_str(&rest[start..]);
            return output;
        };

        let name = &after_open[..end];
        match values.iter().find(|(key, _)| *key == name) {
            Some((_, value)) => output.push_str(value),
            None => {
                output.push_str("{{");
                output.push_str(name);
                output.push_str("}}");
            }
        }
        rest = &after_open[end + 2..];
    }

    output.push_str(rest);
    output
}
