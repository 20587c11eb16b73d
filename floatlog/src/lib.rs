//! Floatlog domain library: turns a semi-structured markdown work log into a tree of entries.
//! The parser stays pure; sources, lookups, search and rendering are layered around it.

pub mod core {
    use chrono::NaiveDate;
    use serde::{Deserialize, Serialize};
    use std::{fmt, str::FromStr};

    /// Title used when a header or metadata block does not provide one.
    pub const DEFAULT_TITLE: &str = "Untitled";

    /* ------------------------------- Status ------------------------------- */

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    pub enum EntryStatus {
        #[default]
        Active,
        Paused,
        InProgress,
        Completed,
    }

    impl EntryStatus {
        pub fn as_str(self) -> &'static str {
            match self {
                EntryStatus::Active => "active",
                EntryStatus::Paused => "paused",
                EntryStatus::InProgress => "in-progress",
                EntryStatus::Completed => "completed",
            }
        }
    }

    impl fmt::Display for EntryStatus {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.pad(self.as_str())
        }
    }

    impl FromStr for EntryStatus {
        type Err = DomainError;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            let wanted = s.trim();
            [
                EntryStatus::Active,
                EntryStatus::Paused,
                EntryStatus::InProgress,
                EntryStatus::Completed,
            ]
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| DomainError::UnknownStatus(s.to_string()))
        }
    }

    /* ------------------------------- Entity ------------------------------- */

    /// One node of the log tree: a logged session or an item lifted out of a metadata block.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Entry {
        /// Generated for sessions, taken from `uid:` for children.
        pub id: String,
        pub title: String,

        /// `YYYY-MM-DD` when the header carried one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub date: Option<String>,

        /// Whatever of the header context was not read as a date.
        pub timestamp: String,

        /// Free-text body; blank lines only once something non-blank was stored.
        #[serde(default)]
        pub context: String,

        #[serde(default)]
        pub resources: Vec<String>,

        #[serde(default)]
        pub tags: Vec<String>,

        pub status: EntryStatus,

        /// Display hint: sessions start expanded, children collapsed.
        pub default_expanded: bool,

        #[serde(default)]
        pub children: Vec<Entry>,
    }

    impl Entry {
        /// Top-level entry opened by a `## [ctx:...]` header.
        pub fn session(id: String, title: String, date: Option<String>, timestamp: String) -> Self {
            Self {
                id,
                title,
                date,
                timestamp,
                context: String::new(),
                resources: vec![],
                tags: vec![],
                status: EntryStatus::Active,
                default_expanded: true,
                children: vec![],
            }
        }

        /// Child described by a metadata block; it inherits the parent's date and timestamp.
        pub fn child_of(parent: &Entry, id: String, title: String) -> Self {
            Self {
                id,
                title,
                date: parent.date.clone(),
                timestamp: parent.timestamp.clone(),
                context: String::new(),
                resources: vec![],
                tags: vec![],
                status: EntryStatus::InProgress,
                default_expanded: false,
                children: vec![],
            }
        }

        /// The header date as a calendar date, if it is a valid one.
        pub fn calendar_date(&self) -> Option<NaiveDate> {
            self.date
                .as_deref()
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        }

        pub(crate) fn push_context_line(&mut self, line: &str) {
            if self.context.is_empty() {
                if line.trim().is_empty() {
                    return;
                }
            } else {
                self.context.push('\n');
            }
            self.context.push_str(line);
        }
    }

    /* ---------------------------- Errors (domain) ---------------------------- */

    #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
    pub enum DomainError {
        #[error("no entry with id {0:?}")]
        EntryNotFound(String),
        #[error("unknown status {0:?} (expected active, paused, in-progress or completed)")]
        UnknownStatus(String),
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn status_labels_round_trip_through_from_str() {
            for label in ["active", "paused", "in-progress", "completed"] {
                let status: EntryStatus = label.parse().expect("known label");
                assert_eq!(status.to_string(), label);
            }
            assert_eq!("In-Progress".parse::<EntryStatus>(), Ok(EntryStatus::InProgress));
            assert_eq!(
                "done".parse::<EntryStatus>(),
                Err(DomainError::UnknownStatus("done".into()))
            );
        }

        #[test]
        fn context_skips_leading_blanks_only() {
            let mut entry = Entry::session("id".into(), "t".into(), None, String::new());
            entry.push_context_line("");
            entry.push_context_line("   ");
            assert_eq!(entry.context, "");
            entry.push_context_line("first");
            entry.push_context_line("");
            entry.push_context_line("second");
            assert_eq!(entry.context, "first\n\nsecond");
        }

        #[test]
        fn child_inherits_parent_time_fields() {
            let parent = Entry::session(
                "p".into(),
                "Parent".into(),
                Some("2025-04-22".into()),
                "11:57pm".into(),
            );
            let child = Entry::child_of(&parent, "c".into(), "Child".into());
            assert_eq!(child.date.as_deref(), Some("2025-04-22"));
            assert_eq!(child.timestamp, "11:57pm");
            assert_eq!(child.status, EntryStatus::InProgress);
            assert!(!child.default_expanded);
        }

        #[test]
        fn calendar_date_ignores_impossible_dates() {
            let mut entry =
                Entry::session("id".into(), "t".into(), Some("2025-04-22".into()), String::new());
            assert_eq!(entry.calendar_date(), NaiveDate::from_ymd_opt(2025, 4, 22));
            entry.date = Some("2025-13-40".into());
            assert_eq!(entry.calendar_date(), None);
        }

        #[test]
        fn serializes_with_display_layer_field_names() {
            let parent = Entry::session("p".into(), "Parent".into(), None, "noon".into());
            let child = Entry::child_of(&parent, "c".into(), "Child".into());
            let value = serde_json::to_value(&child).expect("serialize");
            assert_eq!(value["status"], "in-progress");
            assert_eq!(value["defaultExpanded"], false);
            assert!(value.get("date").is_none());
        }
    }
}

pub mod ids {
    //! Identifier generation for top-level entries.
    //!
    //! Raw logs carry no identifier for sessions, so one is minted per header. The generator
    //! is injected into the parser so tests can swap in a deterministic one.

    use chrono::Utc;
    use uuid::Uuid;

    pub trait IdGenerator {
        fn next_id(&mut self) -> String;
    }

    impl<G: IdGenerator + ?Sized> IdGenerator for &mut G {
        fn next_id(&mut self) -> String {
            (**self).next_id()
        }
    }

    /// `ctx-<unix millis>-<7 random chars>`; unique in practice, never reproducible.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct ClockIds;

    impl IdGenerator for ClockIds {
        fn next_id(&mut self) -> String {
            let millis = Utc::now().timestamp_millis();
            let random = Uuid::new_v4().simple().to_string();
            format!("ctx-{millis}-{}", &random[..7])
        }
    }

    /// `<prefix>-1`, `<prefix>-2`, ...
    #[derive(Debug, Clone)]
    pub struct SequentialIds {
        prefix: String,
        next: u64,
    }

    impl SequentialIds {
        pub fn new(prefix: impl Into<String>) -> Self {
            Self {
                prefix: prefix.into(),
                next: 1,
            }
        }
    }

    impl Default for SequentialIds {
        fn default() -> Self {
            Self::new("ctx")
        }
    }

    impl IdGenerator for SequentialIds {
        fn next_id(&mut self) -> String {
            let id = format!("{}-{}", self.prefix, self.next);
            self.next += 1;
            id
        }
    }

}

pub mod config {
    use crate::core::DEFAULT_TITLE;
    use anyhow::{Context, Result};
    use serde::{Deserialize, Serialize};
    use std::{fs, path::Path};
    use tracing::debug;

    /// Parser settings; the defaults reproduce the stock floatlog format.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct ParserConfig {
        /// Title for headers and metadata blocks that lack one.
        pub default_title: String,

        /// `### ` sections whose title contains one of these collect resources.
        pub resource_sections: Vec<String>,
    }

    impl Default for ParserConfig {
        fn default() -> Self {
            Self {
                default_title: DEFAULT_TITLE.to_string(),
                resource_sections: vec!["Float Chats".into(), "Linked Resources".into()],
            }
        }
    }

    impl ParserConfig {
        pub fn from_toml_str(text: &str) -> Result<Self> {
            toml::from_str(text).context("parsing parser config")
        }

        pub fn load(path: &Path) -> Result<Self> {
            let text =
                fs::read_to_string(path).with_context(|| format!("reading config {:?}", path))?;
            let config =
                Self::from_toml_str(&text).with_context(|| format!("loading config {:?}", path))?;
            debug!(?path, sections = ?config.resource_sections, "loaded parser config");
            Ok(config)
        }

        pub fn is_resource_section(&self, section_title: &str) -> bool {
            self.resource_sections
                .iter()
                .filter(|name| !name.is_empty())
                .any(|name| section_title.contains(name.as_str()))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn partial_toml_keeps_defaults() {
            let config = ParserConfig::from_toml_str("default_title = \"(none)\"\n").expect("parse");
            assert_eq!(config.default_title, "(none)");
            assert_eq!(config.resource_sections, ParserConfig::default().resource_sections);
        }

        #[test]
        fn section_match_is_substring_and_ignores_empty_names() {
            let config = ParserConfig {
                resource_sections: vec![String::new(), "Links".into()],
                ..ParserConfig::default()
            };
            assert!(config.is_resource_section("**Links** for later"));
            assert!(!config.is_resource_section("Summary"));
        }

        #[test]
        fn load_reports_the_path() {
            let tmp = tempfile::tempdir().expect("tempdir");
            let path = tmp.path().join("floatlog.toml");
            std::fs::write(&path, "resource_sections = 3\n").expect("write");
            let err = ParserConfig::load(&path).expect_err("bad type");
            assert!(format!("{err:#}").contains("floatlog.toml"));
        }
    }
}

pub mod block {
    //! Field extraction for `---` delimited metadata blocks.
    //!
    //! Only `uid`, `title`, `tags` and `linkedTo` are understood. Keys are found by plain
    //! substring search over the raw block text; the first usable occurrence wins.

    use crate::parser::PResult;
    use nom::{
        bytes::complete::take_till,
        character::complete::char,
        sequence::delimited,
    };

    #[derive(Debug, Clone, PartialEq, Eq, Default)]
    pub struct MetaBlock {
        pub uid: Option<String>,
        pub title: Option<String>,
        /// Already `#`-prefixed.
        pub tags: Option<Vec<String>>,
        pub linked_to: Option<Vec<String>>,
    }

    impl MetaBlock {
        pub fn parse(raw: &str) -> Self {
            Self {
                uid: scalar_field(raw, "uid:").map(str::to_string),
                title: scalar_field(raw, "title:").map(str::to_string),
                tags: bracket_list(raw, "tags:").map(|inner| {
                    inner
                        .split(',')
                        .map(|tag| format!("#{}", tag.trim()))
                        .collect()
                }),
                linked_to: bullet_list(raw, "linkedTo:"),
            }
        }
    }

    fn tails<'a>(raw: &'a str, key: &'static str) -> impl Iterator<Item = &'a str> {
        raw.match_indices(key)
            .map(move |(pos, _)| &raw[pos + key.len()..])
    }

    /// `key:` then optional blanks (line breaks included) then the rest of that line, trimmed.
    fn scalar_field<'a>(raw: &'a str, key: &'static str) -> Option<&'a str> {
        for after in tails(raw, key) {
            let value = after.trim_start();
            if !value.is_empty() {
                let end = value.find('\n').unwrap_or(value.len());
                return Some(value[..end].trim());
            }
            // Only blanks remain: a non-break blank still counts as an (empty) value.
            if after.contains(|c: char| c != '\n') {
                return Some("");
            }
        }
        None
    }

    fn bracketed(i: &str) -> PResult<'_, &str> {
        delimited(
            char('['),
            take_till(|c: char| matches!(c, ']' | '\n' | '\r')),
            char(']'),
        )(i)
    }

    /// `key: [a, b]`, the bracket closing on the line it opened on.
    fn bracket_list<'a>(raw: &'a str, key: &'static str) -> Option<&'a str> {
        tails(raw, key).find_map(|after| {
            bracketed(after.trim_start())
                .ok()
                .map(|(_, inner)| inner)
        })
    }

    /// `key:` alone on its line, followed by at least one `- value` bullet.
    fn bullet_list(raw: &str, key: &'static str) -> Option<Vec<String>> {
        tails(raw, key).find_map(|after| {
            let (first, rest) = after.split_once('\n')?;
            if !first.trim().is_empty() {
                return None;
            }
            let mut items = Vec::new();
            for line in rest.split('\n') {
                let line = line.trim_start();
                if line.is_empty() {
                    continue;
                }
                match line.strip_prefix('-') {
                    Some(value) => items.push(value.trim().to_string()),
                    None => break,
                }
            }
            (!items.is_empty()).then_some(items)
        })
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn reads_all_four_fields() {
            let raw = "uid: floatlog::x \ntitle: Sample\ntags: [a,  b ]\nlinkedTo:\n  - one\n  - https://example.com/a-b\n";
            let meta = MetaBlock::parse(raw);
            assert_eq!(meta.uid.as_deref(), Some("floatlog::x"));
            assert_eq!(meta.title.as_deref(), Some("Sample"));
            assert_eq!(meta.tags, Some(vec!["#a".to_string(), "#b".to_string()]));
            assert_eq!(
                meta.linked_to,
                Some(vec!["one".to_string(), "https://example.com/a-b".to_string()])
            );
        }

        #[test]
        fn missing_fields_stay_none() {
            let meta = MetaBlock::parse("note: nothing useful\n");
            assert_eq!(meta, MetaBlock::default());
        }

        #[test]
        fn empty_brackets_give_one_bare_hash() {
            let meta = MetaBlock::parse("tags: []\n");
            assert_eq!(meta.tags, Some(vec!["#".to_string()]));
        }

        #[test]
        fn unclosed_bracket_is_not_a_tag_list() {
            let meta = MetaBlock::parse("tags: [a, b\n]\n");
            assert_eq!(meta.tags, None);
        }

        #[test]
        fn blank_uid_is_present_but_empty() {
            let meta = MetaBlock::parse("uid:   \n");
            assert_eq!(meta.uid.as_deref(), Some(""));
            assert_eq!(MetaBlock::parse("uid:\n").uid, None);
        }

        #[test]
        fn linked_to_tolerates_blank_lines_and_stops_at_next_key() {
            let raw = "linkedTo:\n  - a\n\n  - b\nstatus: open\n  - c\n";
            assert_eq!(
                MetaBlock::parse(raw).linked_to,
                Some(vec!["a".to_string(), "b".to_string()])
            );
        }

        #[test]
        fn inline_linked_to_value_is_ignored() {
            let raw = "linkedTo: [a, b]\n  - stray\n";
            assert_eq!(MetaBlock::parse(raw).linked_to, None);
        }
    }
}

pub mod parser {
    //! Line-oriented parser for floatlog markdown.
    //!
    //! Single forward pass over `\n`-split lines:
    //! - every line is classified into a [`LineKind`] by [`classify_line`],
    //! - a parse state applies the classified line to the entry being built,
    //! - lines inside a `---` metadata block bypass classification until the closing delimiter,
    //! - a resource section is the only rule that consumes lines ahead of the cursor.
    //!
    //! Nothing here fails: malformed input degrades to defaults.

    use crate::block::MetaBlock;
    use crate::config::ParserConfig;
    use crate::core::Entry;
    use crate::ids::{ClockIds, IdGenerator};
    use nom::{
        IResult,
        bytes::complete::{tag, take_till1, take_while_m_n},
        character::complete::{char, multispace0},
        combinator::{recognize, rest},
        error::{VerboseError, VerboseErrorKind},
        sequence::tuple,
    };
    use tracing::{debug, trace};

    pub(crate) type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

    pub const HEADER_OPEN: &str = "## [ctx:";
    pub const BLOCK_DELIMITER: &str = "---";
    const TAG_LINE_PREFIX: &str = "- #";
    const SECTION_PREFIX: &str = "### ";

    /* ------------------------------ Lines ------------------------------ */

    /// The pieces of a `## [ctx:<info>]<title>` header, both trimmed.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Header<'a> {
        pub info: &'a str,
        pub title: &'a str,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum LineKind<'a> {
        TopHeader(Header<'a>),
        BlockDelimiter,
        TagList(Vec<String>),
        ResourceSectionHeader,
        PlainContent,
    }

    /// Classify a line outside a metadata block. First match wins, in declaration order.
    pub fn classify_line<'a>(line: &'a str, config: &ParserConfig) -> LineKind<'a> {
        if let Some(header) = find_header(line) {
            return LineKind::TopHeader(header);
        }
        let trimmed = line.trim();
        if trimmed == BLOCK_DELIMITER {
            return LineKind::BlockDelimiter;
        }
        if trimmed.starts_with(TAG_LINE_PREFIX) {
            let tags = trimmed["- ".len()..]
                .split(',')
                .map(|tag| tag.trim().to_string())
                .collect();
            return LineKind::TagList(tags);
        }
        if let Some(section) = trimmed.strip_prefix(SECTION_PREFIX) {
            if config.is_resource_section(section) {
                return LineKind::ResourceSectionHeader;
            }
        }
        LineKind::PlainContent
    }

    /// Find a `## [ctx:...]` header anywhere in the line.
    pub fn find_header(line: &str) -> Option<Header<'_>> {
        line.match_indices(HEADER_OPEN)
            .find_map(|(pos, _)| header(&line[pos..]).ok().map(|(_, h)| h))
    }

    fn header(i: &str) -> PResult<'_, Header<'_>> {
        let (i, _) = tag(HEADER_OPEN)(i)?;
        let (i, info) = take_till1(|c: char| c == ']')(i)?;
        let (i, _) = char(']')(i)?;
        let (i, title) = rest(i)?;
        Ok((
            i,
            Header {
                info: info.trim(),
                title: title.trim(),
            },
        ))
    }

    /// Split `<YYYY-MM-DD> - <rest>` found anywhere in the header info into date and rest.
    pub fn split_date(info: &str) -> Option<(&str, &str)> {
        info.char_indices()
            .find_map(|(pos, _)| dated(&info[pos..]).ok().map(|(_, pair)| pair))
    }

    fn dated(i: &str) -> PResult<'_, (&str, &str)> {
        let (i, date) = recognize(tuple((
            digits(4),
            char('-'),
            digits(2),
            char('-'),
            digits(2),
        )))(i)?;
        let (i, _) = tuple((multispace0, char('-'), multispace0))(i)?;
        if i.is_empty() {
            return Err(nom::Err::Error(VerboseError {
                errors: vec![(i, VerboseErrorKind::Context("ctx-rest"))],
            }));
        }
        Ok(("", (date, i)))
    }

    fn digits(count: usize) -> impl Fn(&str) -> PResult<'_, &str> {
        move |i: &str| take_while_m_n(count, count, |c: char| c.is_ascii_digit())(i)
    }

    /* ------------------------------ State ------------------------------ */

    /// Everything the parser carries from one line to the next.
    #[derive(Debug, Default)]
    struct ParseState {
        current: Option<Entry>,
        in_block: bool,
        block: String,
        output: Vec<Entry>,
    }

    impl ParseState {
        fn finalize_current(&mut self) {
            if let Some(entry) = self.current.take() {
                trace!(id = %entry.id, children = entry.children.len(), "finalized entry");
                self.output.push(entry);
            }
        }

        fn open_block(&mut self) {
            self.in_block = true;
            self.block.clear();
        }

        fn close_block(&mut self, config: &ParserConfig) {
            self.in_block = false;
            let Some(parent) = self.current.as_mut() else {
                debug!("metadata block before the first header dropped");
                return;
            };
            let meta = MetaBlock::parse(&self.block);
            let Some(uid) = meta.uid else {
                debug!(parent = %parent.id, "metadata block without uid discarded");
                return;
            };
            let title = meta.title.unwrap_or_else(|| config.default_title.clone());
            let mut child = Entry::child_of(parent, uid, title);
            if let Some(tags) = meta.tags {
                child.tags = tags;
            }
            if let Some(resources) = meta.linked_to {
                child.resources = resources;
            }
            trace!(parent = %parent.id, child = %child.id, "attached child entry");
            parent.children.push(child);
        }

        fn finish(mut self) -> Vec<Entry> {
            if self.in_block {
                debug!(bytes = self.block.len(), "input ended inside a metadata block");
            }
            self.finalize_current();
            self.output
        }
    }

    /* ------------------------------ Parser ------------------------------ */

    /// Floatlog parser; owns its settings and the generator for session ids.
    #[derive(Debug, Clone)]
    pub struct LogParser<G = ClockIds> {
        config: ParserConfig,
        ids: G,
    }

    impl LogParser<ClockIds> {
        pub fn new() -> Self {
            Self::with_config(ParserConfig::default())
        }

        pub fn with_config(config: ParserConfig) -> Self {
            Self {
                config,
                ids: ClockIds,
            }
        }
    }

    impl Default for LogParser<ClockIds> {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<G: IdGenerator> LogParser<G> {
        pub fn with_ids(config: ParserConfig, ids: G) -> Self {
            Self { config, ids }
        }

        pub fn config(&self) -> &ParserConfig {
            &self.config
        }

        /// Parse a whole log into top-level entries, in input order.
        pub fn parse(&mut self, input: &str) -> Vec<Entry> {
            let lines: Vec<&str> = input.split('\n').collect();
            let mut state = ParseState::default();
            let mut idx = 0;

            while idx < lines.len() {
                let line = lines[idx];
                idx += 1;

                // Block interiors are opaque, headers included.
                if state.in_block {
                    if line.trim() == BLOCK_DELIMITER {
                        state.close_block(&self.config);
                    } else {
                        state.block.push_str(line);
                        state.block.push('\n');
                    }
                    continue;
                }

                match classify_line(line, &self.config) {
                    LineKind::TopHeader(header) => {
                        state.finalize_current();
                        state.current = Some(self.open_entry(&header));
                    }
                    LineKind::BlockDelimiter => state.open_block(),
                    LineKind::TagList(tags) => {
                        if let Some(entry) = state.current.as_mut() {
                            entry.tags = tags;
                        }
                    }
                    LineKind::ResourceSectionHeader => {
                        if let Some(entry) = state.current.as_mut() {
                            let (resources, next) = collect_resources(&lines, idx);
                            trace!(id = %entry.id, count = resources.len(), "resource section");
                            entry.resources = resources;
                            idx = next;
                        }
                    }
                    LineKind::PlainContent => {
                        if let Some(entry) = state.current.as_mut() {
                            entry.push_context_line(line);
                        }
                    }
                }
            }

            let entries = state.finish();
            debug!(entries = entries.len(), "parsed log");
            entries
        }

        fn open_entry(&mut self, header: &Header<'_>) -> Entry {
            let (date, timestamp) = match split_date(header.info) {
                Some((date, rest)) => (Some(date.to_string()), rest.to_string()),
                None => (None, header.info.to_string()),
            };
            let title = if header.title.is_empty() {
                self.config.default_title.clone()
            } else {
                header.title.to_string()
            };
            Entry::session(self.ids.next_id(), title, date, timestamp)
        }
    }

    /// Collect resource lines from `start` up to the next header or `### ` line.
    /// Returns the resources and the index of the first line not consumed.
    fn collect_resources(lines: &[&str], start: usize) -> (Vec<String>, usize) {
        let mut resources = Vec::new();
        let mut idx = start;
        while let Some(line) = lines.get(idx) {
            if line.starts_with(SECTION_PREFIX) || find_header(line).is_some() {
                break;
            }
            let item = line.trim();
            if !item.is_empty() && item != BLOCK_DELIMITER {
                resources.push(item.to_string());
            }
            idx += 1;
        }
        (resources, idx)
    }

    /// Parse with default settings and clock-based session ids.
    pub fn parse_log(input: &str) -> Vec<Entry> {
        LogParser::new().parse(input)
    }

}

pub mod storage {
    //! Content sources that hand raw log text to the parser.

    use crate::core::Entry;
    use crate::ids::IdGenerator;
    use crate::parser::LogParser;
    use anyhow::{Context, Result};
    use std::{
        fs,
        path::{Path, PathBuf},
    };
    use tracing::debug;

    /// A small log exercising every construct the parser understands.
    pub const SAMPLE_LOG: &str = include_str!("sample.md");

    pub trait LogSource {
        fn read_log(&self) -> Result<String>;

        /// Short label for diagnostics.
        fn describe(&self) -> String;
    }

    #[derive(Debug, Clone)]
    pub struct FileSource {
        path: PathBuf,
    }

    impl FileSource {
        pub fn new(path: impl Into<PathBuf>) -> Self {
            Self { path: path.into() }
        }

        pub fn path(&self) -> &Path {
            &self.path
        }
    }

    impl LogSource for FileSource {
        fn read_log(&self) -> Result<String> {
            fs::read_to_string(&self.path).with_context(|| format!("reading {:?}", self.path))
        }

        fn describe(&self) -> String {
            self.path.display().to_string()
        }
    }

    /// Serves [`SAMPLE_LOG`].
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SampleSource;

    impl LogSource for SampleSource {
        fn read_log(&self) -> Result<String> {
            Ok(SAMPLE_LOG.to_string())
        }

        fn describe(&self) -> String {
            "built-in sample".to_string()
        }
    }

    /// Read the whole source, then parse it. A failed read never reaches the parser.
    pub fn load_entries<G: IdGenerator>(
        source: &dyn LogSource,
        parser: &mut LogParser<G>,
    ) -> Result<Vec<Entry>> {
        let text = source.read_log()?;
        debug!(source = %source.describe(), bytes = text.len(), "read log");
        Ok(parser.parse(&text))
    }

}

pub mod service {
    //! In-memory operations the display layer performs on a parsed tree.

    use crate::core::{DomainError, Entry};
    use tracing::debug;

    /// Depth-first, pre-order; the first entry with `id` wins.
    pub fn find_entry<'a>(entries: &'a [Entry], id: &str) -> Option<&'a Entry> {
        for entry in entries {
            if entry.id == id {
                return Some(entry);
            }
            if let Some(found) = find_entry(&entry.children, id) {
                return Some(found);
            }
        }
        None
    }

    pub fn find_entry_mut<'a>(entries: &'a mut [Entry], id: &str) -> Option<&'a mut Entry> {
        for entry in entries.iter_mut() {
            if entry.id == id {
                return Some(entry);
            }
            if let Some(found) = find_entry_mut(&mut entry.children, id) {
                return Some(found);
            }
        }
        None
    }

    /// Replace the context of the entry with `id`. Nothing is persisted.
    pub fn update_context(entries: &mut [Entry], id: &str, content: &str) -> Result<(), DomainError> {
        let entry =
            find_entry_mut(entries, id).ok_or_else(|| DomainError::EntryNotFound(id.to_string()))?;
        debug!(id, bytes = content.len(), "updated entry context");
        entry.context = content.to_string();
        Ok(())
    }

    /// Pre-order traversal paired with depth (0 for top-level entries).
    pub fn walk(entries: &[Entry]) -> Vec<(usize, &Entry)> {
        fn rec<'a>(xs: &'a [Entry], depth: usize, out: &mut Vec<(usize, &'a Entry)>) {
            for x in xs {
                out.push((depth, x));
                rec(&x.children, depth + 1, out);
            }
        }
        let mut out = Vec::new();
        rec(entries, 0, &mut out);
        out
    }

}

pub mod projectors {
    pub mod search_projector {
        use crate::core::{Entry, EntryStatus};
        use chrono::NaiveDate;

        /// Filters over top-level entries; every set field must match.
        #[derive(Debug, Clone, Default)]
        pub struct SearchQuery {
            /// Case-insensitive; matched against title, context, tags and id.
            pub text: Option<String>,
            pub status: Option<EntryStatus>,
            /// Inclusive.
            pub from: Option<NaiveDate>,
            /// Inclusive.
            pub to: Option<NaiveDate>,
        }

        impl SearchQuery {
            pub fn matches(&self, entry: &Entry) -> bool {
                self.matches_text(entry) && self.matches_status(entry) && self.matches_dates(entry)
            }

            fn matches_text(&self, entry: &Entry) -> bool {
                let Some(text) = self.text.as_deref() else {
                    return true;
                };
                let needle = text.to_lowercase();
                if needle.is_empty() {
                    return true;
                }
                let hit = |s: &str| s.to_lowercase().contains(&needle);
                hit(&entry.title)
                    || hit(&entry.context)
                    || entry.tags.iter().any(|t| hit(t))
                    || hit(&entry.id)
            }

            fn matches_status(&self, entry: &Entry) -> bool {
                self.status.is_none_or(|s| s == entry.status)
            }

            fn matches_dates(&self, entry: &Entry) -> bool {
                if self.from.is_none() && self.to.is_none() {
                    return true;
                }
                let Some(date) = entry.calendar_date() else {
                    return false;
                };
                self.from.is_none_or(|from| date >= from) && self.to.is_none_or(|to| date <= to)
            }
        }

        /// Top-level entries matching `query`, in input order.
        pub fn search<'a>(entries: &'a [Entry], query: &SearchQuery) -> Vec<&'a Entry> {
            entries.iter().filter(|e| query.matches(e)).collect()
        }

    }
}

pub mod format {
    //! Plain-text outline of an entry tree, for terminals.

    use super::core::*;

    #[derive(Debug, Clone, Copy, Default)]
    pub struct OutlineOptions {
        /// Ignore `default_expanded` and render every body and child.
        pub expand_all: bool,
    }

    pub fn render_outline(entries: &[Entry], opts: OutlineOptions) -> String {
        let mut out = String::new();
        for entry in entries {
            render_entry(&mut out, entry, 0, opts);
        }
        out
    }

    /// Resource text as shown to a reader: links lose their scheme.
    pub fn display_resource(resource: &str) -> &str {
        resource
            .strip_prefix("https://")
            .or_else(|| resource.strip_prefix("http://"))
            .unwrap_or(resource)
    }

    fn render_entry(out: &mut String, entry: &Entry, depth: usize, opts: OutlineOptions) {
        let indent = "  ".repeat(depth);
        push_line(out, &indent, &format!("- {}", headline(entry)));
        if !(opts.expand_all || entry.default_expanded) {
            return;
        }

        let body = format!("{indent}    ");
        push_line(out, &body, &format!("id: {}", entry.id));
        if !entry.tags.is_empty() {
            push_line(out, &body, &format!("tags: {}", entry.tags.join(", ")));
        }
        if !entry.resources.is_empty() {
            push_line(out, &body, "resources:");
            for resource in &entry.resources {
                push_line(out, &body, &format!("  * {}", display_resource(resource)));
            }
        }
        for line in entry.context.lines() {
            if line.is_empty() {
                push_line(out, &body, "|");
            } else {
                push_line(out, &body, &format!("| {line}"));
            }
        }

        for child in &entry.children {
            render_entry(out, child, depth + 1, opts);
        }
    }

    fn headline(entry: &Entry) -> String {
        let mut s = format!("{} [{}]", entry.title, entry.status);
        if let Some(date) = &entry.date {
            s.push(' ');
            s.push_str(date);
        }
        if !entry.timestamp.is_empty() {
            s.push(' ');
            s.push_str(&entry.timestamp);
        }
        s
    }

    fn push_line(out: &mut String, indent: &str, text: &str) {
        out.push_str(indent);
        out.push_str(text);
        out.push('\n');
    }

}

pub use format::render_outline;
pub use parser::{LogParser, parse_log};
