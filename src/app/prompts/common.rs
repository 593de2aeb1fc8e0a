//! Rules shared by every generation prompt
//!
//! Interpolated into both templates so fresh generations and improvements produce artifacts
//! with the same shape and the same data-access contract.

#![warn(clippy::all, rust_2018_idioms)]

/// How generated code reaches data
pub const DATA_ACCESS_RULES: &str = r#"## Data Access

The ONLY way to get data is the `fetchData(url)` function. It is injected into the page
before your code runs; do not define, import or polyfill it.

- `fetchData(url)` performs a GET request against the API described above and returns a
  Promise that resolves with the parsed JSON response, or rejects with an Error whose
  message describes the failure (including a timeout after 30 seconds).
- Usage: `const data = await fetchData('/api/users');`
- Do NOT use `fetch`, `XMLHttpRequest`, WebSockets or any other network API - they are
  blocked in the sandbox.
- Do NOT use localStorage, sessionStorage, cookies or IndexedDB - storage is unavailable.
- Only call endpoints that appear in the API description."#;

/// What the answer must look like
pub const OUTPUT_RULES: &str = r#"## Output Requirements

- Respond with ONE complete, self-contained HTML document: `<!DOCTYPE html>`, `<html>`,
  `<head>` and `<body>`, with all CSS in `<style>` and all JavaScript in `<script>` tags.
- Output ONLY the HTML document. No explanations, no markdown, no code fences.
- External libraries may be loaded from a public CDN with `<script src>` (for example
  Chart.js or D3); everything else must be inline.
- Make it look professional and responsive: clean typography, consistent spacing, readable
  colors, layouts that adapt to the available width.
- Show a loading indicator while data is being fetched and a clear, friendly message when a
  request fails. Never leave the page blank.
- Fill the available render area: use `width: 100%` and fluid sizing. Do NOT set fixed
  widths or heights on `html` or `body`, do not exceed the viewport, and do not hide
  overflow of the whole page."#;
