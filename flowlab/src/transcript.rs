// FlowLab: Provisioning and Verifying Emulated Networks
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! # Transcript
//!
//! Human-readable record of a run. The transcript is a flat text file with the title, a rule, and
//! all sections in the order in which they were recorded:
//!
//! ```text
//! <title>
//! ============================================================
//!
//! === <section title> ===
//! <section body>
//! ```
//!
//! Body lines which look like a section header are indented by one more space when rendered, and
//! the space is removed again when parsing.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

lazy_static! {
    static ref SECTION_RE: Regex = Regex::new(r"^=== (.*) ===$").unwrap();
    static ref ESCAPED_RE: Regex = Regex::new(r"^ *=== ").unwrap();
}

const RULE_WIDTH: usize = 60;

/// Single titled section
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    /// Title of the section
    pub title: String,
    /// Body, without leading or trailing whitespace
    pub body: String,
}

/// # Transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct Transcript {
    /// Title of the transcript
    pub title: String,
    /// Sections, in the order in which they were recorded
    pub sections: Vec<Section>,
}

/// Difference of a single section between two transcripts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionDiff {
    /// Both transcripts have the same body
    Unchanged(String),
    /// Body differs
    Changed {
        /// Section title
        title: String,
        /// Body in the first transcript
        before: String,
        /// Body in the second transcript
        after: String,
    },
    /// Section only exists in the second transcript
    Added(String),
    /// Section only exists in the first transcript
    Removed(String),
}

impl Transcript {
    /// Create an empty transcript
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into(), sections: Vec::new() }
    }

    /// Append a section. The body is trimmed.
    pub fn push_section(&mut self, title: impl Into<String>, body: impl AsRef<str>) {
        self.sections
            .push(Section { title: title.into(), body: body.as_ref().trim().to_string() });
    }

    /// Get the first section with the given title
    pub fn section(&self, title: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.title == title)
    }

    /// All section titles, in order
    pub fn titles(&self) -> Vec<&str> {
        self.sections.iter().map(|s| s.title.as_str()).collect()
    }

    /// Render the transcript as flat text
    pub fn render(&self) -> String {
        let mut out = format!("{}\n{}\n", self.title, "=".repeat(RULE_WIDTH));
        for section in self.sections.iter() {
            out.push_str(&format!("\n=== {} ===\n", section.title));
            for line in section.body.lines() {
                if ESCAPED_RE.is_match(line) {
                    out.push(' ');
                }
                out.push_str(line);
                out.push('\n');
            }
            if section.body.is_empty() {
                out.push('\n');
            }
        }
        out
    }

    /// Write the rendered transcript to a file
    pub fn write_to(&self, path: impl AsRef<Path>) -> io::Result<()> {
        fs::write(path, self.render())
    }

    /// Read a rendered transcript back. Lines before the first section header (except the title
    /// and the rule) are ignored.
    pub fn parse(text: &str) -> Self {
        let mut lines = text.lines();
        let title = lines.next().unwrap_or_default().trim().to_string();
        let mut transcript = Self::new(title);
        let mut current: Option<(String, Vec<&str>)> = None;
        for line in lines {
            if let Some(c) = SECTION_RE.captures(line) {
                if let Some((title, body)) = current.take() {
                    transcript.push_section(title, body.join("\n"));
                }
                current = Some((c[1].to_string(), Vec::new()));
            } else if let Some((_, body)) = current.as_mut() {
                match line.strip_prefix(' ') {
                    Some(unescaped) if ESCAPED_RE.is_match(line) => body.push(unescaped),
                    _ => body.push(line),
                }
            }
        }
        if let Some((title, body)) = current {
            transcript.push_section(title, body.join("\n"));
        }
        transcript
    }

    /// Read a transcript from a file
    pub fn read_from(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::parse(&fs::read_to_string(path)?))
    }

    /// Compare the sections of two transcripts by their title. Sections with the same title are
    /// matched in the order of their occurrence. The result first lists the sections of `self` in
    /// order, followed by the sections that only exist in `other`.
    pub fn compare(&self, other: &Self) -> Vec<SectionDiff> {
        let mut diff = Vec::new();
        for (section, n) in self.numbered() {
            match other.nth_section(&section.title, n) {
                Some(o) if o.body == section.body => {
                    diff.push(SectionDiff::Unchanged(section.title.clone()))
                }
                Some(o) => diff.push(SectionDiff::Changed {
                    title: section.title.clone(),
                    before: section.body.clone(),
                    after: o.body.clone(),
                }),
                None => diff.push(SectionDiff::Removed(section.title.clone())),
            }
        }
        for (section, n) in other.numbered() {
            if self.nth_section(&section.title, n).is_none() {
                diff.push(SectionDiff::Added(section.title.clone()));
            }
        }
        diff
    }

    /// All sections, together with the number of earlier sections with the same title
    fn numbered(&self) -> Vec<(&Section, usize)> {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        self.sections
            .iter()
            .map(|s| {
                let n = seen.entry(s.title.as_str()).or_insert(0);
                *n += 1;
                (s, *n - 1)
            })
            .collect()
    }

    fn nth_section(&self, title: &str, n: usize) -> Option<&Section> {
        self.sections.iter().filter(|s| s.title == title).nth(n)
    }
}
