// Delimiter Tokenizer
// Splits a text run into delimiter-terminated chunks, refusing to cut inside
// brackets or quotes when a nesting table is supplied.

use regex::{Match, Regex};
use regex_syntax::hir::{Hir, HirKind};

/// Bracket pairs and self-paired quotes tracked while scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestingTable {
    pairs: Vec<(char, char)>,
    quotes: Vec<char>,
}

impl Default for NestingTable {
    fn default() -> Self {
        Self {
            pairs: vec![
                ('(', ')'),
                ('[', ']'),
                ('{', '}'),
                ('（', '）'),
                ('【', '】'),
                ('［', '］'),
                ('｛', '｝'),
                ('「', '」'),
                ('『', '』'),
                ('《', '》'),
                ('〈', '〉'),
                ('“', '”'),
                ('‘', '’'),
            ],
            quotes: vec!['"', '\'', '`'],
        }
    }
}

impl NestingTable {
    pub fn new(pairs: Vec<(char, char)>, quotes: Vec<char>) -> Self {
        Self { pairs, quotes }
    }

    fn closer_for(&self, open: char) -> Option<char> {
        self.pairs.iter().find(|(o, _)| *o == open).map(|(_, c)| *c)
    }

    fn is_opener(&self, ch: char) -> bool {
        self.pairs.iter().any(|(o, _)| *o == ch)
    }

    fn is_closer(&self, ch: char) -> bool {
        self.pairs.iter().any(|(_, c)| *c == ch)
    }

    fn is_quote(&self, ch: char) -> bool {
        self.quotes.contains(&ch)
    }
}

/// Compiled delimiter pattern.
///
/// When the pattern is an alternation mixing zero-width and consuming
/// branches (`\b|\.`), the consuming branches are also kept on their own so
/// a position where the zero-width branch wins can still be cut.
#[derive(Debug, Clone)]
pub struct Delimiter {
    pattern: Regex,
    consuming: Option<Regex>,
}

impl Delimiter {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let compiled = Regex::new(pattern)?;
        Ok(Self {
            pattern: compiled,
            consuming: consuming_branches(pattern),
        })
    }

    pub fn as_regex(&self) -> &Regex {
        &self.pattern
    }
}

fn consuming_branches(pattern: &str) -> Option<Regex> {
    let hir = regex_syntax::Parser::new().parse(pattern).ok()?;
    let HirKind::Alternation(branches) = hir.kind() else {
        return None;
    };
    let (consuming, zero_width): (Vec<Hir>, Vec<Hir>) = branches
        .iter()
        .cloned()
        .partition(|branch| branch.properties().minimum_len().is_some_and(|n| n > 0));
    if consuming.is_empty() || zero_width.is_empty() {
        return None;
    }
    Regex::new(&Hir::alternation(consuming).to_string()).ok()
}

/// `re.find_at(text, from)`, reusing the previous search while it still
/// answers the query. `from` only moves forward within one run.
fn find_from<'t>(
    re: &Regex,
    text: &'t str,
    from: usize,
    cache: &mut Option<(usize, Option<Match<'t>>)>,
) -> Option<Match<'t>> {
    if let Some((searched, found)) = *cache {
        if searched <= from && found.map_or(true, |m| m.start() >= from) {
            return found;
        }
    }
    let found = re.find_at(text, from);
    *cache = Some((from, found));
    found
}

/// One piece of a text run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Chunk text, including its trailing delimiter when terminated.
    pub text: &'a str,
    pub terminated: bool,
}

/// Lazy chunk iterator over one text run. Consumed once.
pub struct Tokenizer<'t, 'r> {
    text: &'t str,
    delimiter: &'r Delimiter,
    nesting: Option<&'r NestingTable>,
    stack: Vec<char>,
    pos: usize,
    chunk_start: usize,
    finished: bool,
    pattern_cache: Option<(usize, Option<Match<'t>>)>,
    consuming_cache: Option<(usize, Option<Match<'t>>)>,
}

impl<'t, 'r> Tokenizer<'t, 'r> {
    /// Without a nesting table every delimiter match splits; with one,
    /// matches are ignored while a bracket or quote is open.
    pub fn new(text: &'t str, delimiter: &'r Delimiter, nesting: Option<&'r NestingTable>) -> Self {
        Self {
            text,
            delimiter,
            nesting,
            stack: Vec::new(),
            pos: 0,
            chunk_start: 0,
            finished: text.is_empty(),
            pattern_cache: None,
            consuming_cache: None,
        }
    }

    /// Next non-empty delimiter match starting at or after `from`.
    fn next_match(&mut self, mut from: usize) -> Option<Match<'t>> {
        let delimiter = self.delimiter;
        while from <= self.text.len() {
            let m = find_from(&delimiter.pattern, self.text, from, &mut self.pattern_cache)?;
            if !m.is_empty() {
                return Some(m);
            }
            if let Some(consuming) = delimiter.consuming.as_ref() {
                let alt = find_from(consuming, self.text, m.start(), &mut self.consuming_cache);
                if let Some(alt) = alt.filter(|a| a.start() == m.start()) {
                    return Some(alt);
                }
            }
            // Zero-width match: step past one character so the scan always advances.
            from = m.end() + self.text[m.end()..].chars().next().map_or(1, char::len_utf8);
        }
        None
    }

    fn is_apostrophe(&self, at: usize, ch: char) -> bool {
        if ch != '\'' {
            return false;
        }
        let before = self.text[..at].chars().next_back();
        let after = self.text[at + ch.len_utf8()..].chars().next();
        matches!((before, after), (Some(b), Some(a)) if b.is_alphanumeric() && a.is_alphanumeric())
    }

    /// Update the nesting stack for the character at byte offset `at`.
    fn track(&mut self, at: usize, ch: char) {
        let Some(table) = self.nesting else {
            return;
        };
        if table.is_quote(ch) {
            if self.is_apostrophe(at, ch) {
                return;
            }
            if self.stack.last() == Some(&ch) {
                self.stack.pop();
            } else {
                self.stack.push(ch);
            }
        } else if table.is_opener(ch) {
            self.stack.push(ch);
        } else if table.is_closer(ch) {
            // Unmatched closers are plain text.
            let matches_top = self
                .stack
                .last()
                .and_then(|open| table.closer_for(*open))
                .is_some_and(|close| close == ch);
            if matches_top {
                self.stack.pop();
            }
        }
    }

    fn emit(&mut self, end: usize, terminated: bool) -> Option<Chunk<'t>> {
        let text = &self.text[self.chunk_start..end];
        self.chunk_start = end;
        if text.is_empty() {
            None
        } else {
            Some(Chunk { text, terminated })
        }
    }

    fn finish(&mut self) -> Option<Chunk<'t>> {
        self.finished = true;
        self.emit(self.text.len(), false)
    }

    fn next_simple(&mut self) -> Option<Chunk<'t>> {
        while let Some(m) = self.next_match(self.pos) {
            self.pos = m.end();
            if let Some(chunk) = self.emit(m.end(), true) {
                return Some(chunk);
            }
        }
        self.finish()
    }

    fn next_nested(&mut self) -> Option<Chunk<'t>> {
        while self.pos < self.text.len() {
            if !self.stack.is_empty() {
                // Inside brackets/quotes every character is literal.
                let ch = match self.text[self.pos..].chars().next() {
                    Some(ch) => ch,
                    None => break,
                };
                self.track(self.pos, ch);
                self.pos += ch.len_utf8();
                continue;
            }

            let next = self.next_match(self.pos);
            let limit = next.map_or(self.text.len(), |m| m.start());

            // Scan literal text up to the match; an opening symbol defers the match.
            let mut opened = false;
            while self.pos < limit {
                let ch = match self.text[self.pos..].chars().next() {
                    Some(ch) => ch,
                    None => break,
                };
                self.track(self.pos, ch);
                self.pos += ch.len_utf8();
                if !self.stack.is_empty() {
                    opened = true;
                    break;
                }
            }
            if opened {
                continue;
            }

            match next {
                Some(m) => {
                    self.pos = m.end();
                    if let Some(chunk) = self.emit(m.end(), true) {
                        return Some(chunk);
                    }
                }
                None => break,
            }
        }
        self.finish()
    }
}

impl<'t, 'r> Iterator for Tokenizer<'t, 'r> {
    type Item = Chunk<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.nesting.is_some() {
            self.next_nested()
        } else {
            self.next_simple()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(text: &str, pattern: &str, nested: bool) -> Vec<(String, bool)> {
        let delimiter = Delimiter::new(pattern).unwrap();
        let table = NestingTable::default();
        Tokenizer::new(text, &delimiter, nested.then_some(&table))
            .map(|c| (c.text.to_string(), c.terminated))
            .collect()
    }

    #[test]
    fn test_simple_keeps_delimiter_on_preceding_chunk() {
        let out = chunks("Hi! Hi", "[!]", false);
        assert_eq!(out, vec![("Hi!".to_string(), true), (" Hi".to_string(), false)]);
    }

    #[test]
    fn test_empty_input_yields_nothing() {
        assert!(chunks("", "[.]", false).is_empty());
        assert!(chunks("", "[.]", true).is_empty());
    }

    #[test]
    fn test_multi_char_delimiter_is_consumed_whole() {
        let out = chunks("Wait...what?!\n\nOk", r"[.?!\n]+", false);
        assert_eq!(
            out,
            vec![
                ("Wait...".to_string(), true),
                ("what?!\n\n".to_string(), true),
                ("Ok".to_string(), false),
            ]
        );
    }

    #[test]
    fn test_no_split_inside_curly_quotes() {
        let out = chunks("“Hello. World.”", "[.]", true);
        assert_eq!(out, vec![("“Hello. World.”".to_string(), false)]);
    }

    #[test]
    fn test_split_resumes_after_bracket_closes() {
        let out = chunks("He said (a. b. c). Then left. Bye", "[.]", true);
        assert_eq!(
            out,
            vec![
                ("He said (a. b. c).".to_string(), true),
                (" Then left.".to_string(), true),
                (" Bye".to_string(), false),
            ]
        );
    }

    #[test]
    fn test_self_paired_quotes_toggle() {
        let out = chunks("She said \"stop. now.\" and went. Done", "[.]", true);
        assert_eq!(out[0].0, "She said \"stop. now.\" and went.");
        assert_eq!(out[1].0, " Done");
    }

    #[test]
    fn test_nested_brackets_and_quotes() {
        let out = chunks("A [x (y. \"z. w\") v.] end. tail", "[.]", true);
        assert_eq!(out[0].0, "A [x (y. \"z. w\") v.] end.");
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_unmatched_closer_is_plain_text() {
        let out = chunks("oops) still splits. yes", "[.]", true);
        assert_eq!(out[0].0, "oops) still splits.");
        assert_eq!(out[1].0, " yes");

        let out = chunks("(a] b. c) d. e", "[.]", true);
        assert_eq!(out[0].0, "(a] b. c) d.");
    }

    #[test]
    fn test_unterminated_bracket_still_emits_tail() {
        let out = chunks("First. (never closed. at all", "[.]", true);
        assert_eq!(
            out,
            vec![
                ("First.".to_string(), true),
                (" (never closed. at all".to_string(), false),
            ]
        );
    }

    #[test]
    fn test_apostrophe_does_not_open_a_quote() {
        let out = chunks("I don't know. Maybe", "[.]", true);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].0, "I don't know.");
    }

    #[test]
    fn test_delimiter_at_start_is_kept() {
        let out = chunks("!Hi", "[!]", false);
        assert_eq!(out, vec![("!".to_string(), true), ("Hi".to_string(), false)]);
    }

    #[test]
    fn test_zero_width_pattern_terminates() {
        let out = chunks("abc", "x*", false);
        assert_eq!(out, vec![("abc".to_string(), false)]);
        let out = chunks("a.b", r"\.|\b", true);
        assert_eq!(out, vec![("a.".to_string(), true), ("b".to_string(), false)]);
    }

    #[test]
    fn test_consuming_branch_wins_over_zero_width_branch() {
        for nested in [false, true] {
            let out = chunks("a.b", r"\b|\.", nested);
            assert_eq!(out, vec![("a.".to_string(), true), ("b".to_string(), false)]);
        }
        let out = chunks("one; two", r"x*|;", false);
        assert_eq!(out, vec![("one;".to_string(), true), (" two".to_string(), false)]);
    }

    #[test]
    fn test_many_bracket_pairs_scan_linearly() {
        let text = "(a) ".repeat(50_000) + "end. tail";
        let delimiter = Delimiter::new("[.]").unwrap();
        let table = NestingTable::default();
        let mut tokenizer = Tokenizer::new(&text, &delimiter, Some(&table));

        let started = std::time::Instant::now();
        let first = tokenizer.next().unwrap();
        assert!(first.text.ends_with("end."));
        assert_eq!(tokenizer.next().unwrap().text, " tail");
        assert!(tokenizer.pattern_cache.is_some());
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
    }

    #[test]
    fn test_cjk_punctuation_and_brackets() {
        let out = chunks("他说「好的。走吧。」然后离开了。再见", "[。]", true);
        assert_eq!(out[0].0, "他说「好的。走吧。」然后离开了。");
        assert_eq!(out[1].0, "再见");
    }

    #[test]
    fn test_chunks_reassemble_input() {
        let text = "One. (Two. three) \"Four.\" five! six";
        for nested in [false, true] {
            let joined: String = chunks(text, "[.!]", nested).into_iter().map(|c| c.0).collect();
            assert_eq!(joined, text);
        }
    }
}
