// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Instruction template for brief analysis.
//!
//! The field names requested here match [`crate::analysis::AnalysisPayload`].

/// System prompt sent with every analysis request.
pub const ANALYSIS_SYSTEM_PROMPT: &str = r#"You are an experienced appellate attorney reviewing a legal brief.

Respond with a single JSON object and nothing else. Do not wrap it in Markdown.
Use exactly these keys:

{
  "summary": "two or three sentence overview of the brief",
  "parties": ["party names and their roles"],
  "keyIssues": ["questions presented or issues in dispute"],
  "arguments": ["the main arguments advanced, strongest first"],
  "citedAuthorities": ["cases, statutes and rules relied on"],
  "weaknesses": ["gaps, unsupported assertions, or likely counterarguments"],
  "recommendations": ["concrete edits that would strengthen the brief"]
}

Use empty arrays when the brief gives no basis for a field. Do not invent
citations that are not in the text."#;

/// User prompt wrapping the brief text.
///
/// Text beyond `max_chars` characters is cut and the cut is announced to the
/// model.
pub fn analysis_user_prompt(brief_text: &str, max_chars: usize) -> String {
    let (text, truncated) = truncate_chars(brief_text.trim(), max_chars);
    let mut prompt = String::with_capacity(text.len() + 128);
    prompt.push_str("Analyze the following brief.\n\n<brief>\n");
    prompt.push_str(text);
    prompt.push_str("\n</brief>");
    if truncated {
        prompt.push_str("\n\nThe brief was truncated; analyze the portion shown.");
    }
    prompt
}

fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => (&text[..idx], true),
        None => (text, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_requests_json_keys() {
        for key in ["summary", "keyIssues", "citedAuthorities", "recommendations"] {
            assert!(ANALYSIS_SYSTEM_PROMPT.contains(key), "missing {key}");
        }
    }

    #[test]
    fn user_prompt_embeds_text() {
        let prompt = analysis_user_prompt("  The court erred.  ", 1000);
        assert!(prompt.contains("<brief>\nThe court erred.\n</brief>"));
        assert!(!prompt.contains("truncated"));
    }

    #[test]
    fn user_prompt_truncates_on_char_boundary() {
        let prompt = analysis_user_prompt("ééééé", 3);
        assert!(prompt.contains("<brief>\nééé\n</brief>"));
        assert!(prompt.contains("truncated"));
    }
}
