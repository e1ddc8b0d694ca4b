//! Prompt construction for the extraction model.

/// The five fields the model is asked to extract, in prompt order.
pub const EXPECTED_FIELDS: [&str; 5] = [
    "Company Name",
    "Report Date",
    "Profit Before Tax",
    "Revenue",
    "Net Profit",
];

/// Build the extraction prompt for one document.
///
/// The document text is embedded verbatim between the field list and the
/// output instruction. An empty text still yields a complete prompt.
pub fn build_prompt(text: &str) -> String {
    let field_list: String = EXPECTED_FIELDS
        .iter()
        .map(|f| format!("- {}\n", f))
        .collect();
    let key_list = EXPECTED_FIELDS
        .iter()
        .map(|f| format!("\"{}\"", f))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "You are a helpful assistant extracting financial data.\n\
         Please find the following details in the text below:\n\
         {field_list}\n\
         Text:\n\
         {text}\n\n\
         Provide the output as valid JSON with keys exactly:\n\
         {key_list}.\n"
    )
}

/// Truncate `text` to at most `max_chars` characters, never splitting a
/// UTF-8 sequence. Returns the (possibly shortened) text and whether it was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (&text[..byte_idx], true),
        None => (text, false),
    }
}
