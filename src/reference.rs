//! Scripture reference parsing.
//!
//! Turns free-text citations ("jn3.16", "1 Cor 13:4-7", "Song of Songs 2.1")
//! into a canonical [`Reference`] without consulting any model. Book names
//! are resolved against a fixed table of the 66 books with their chapter
//! counts and common abbreviations.

use crate::error::{InsightError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use unicode_normalization::UnicodeNormalization;

/// A book of the canon with its chapter count and accepted synonyms
#[derive(Debug)]
pub struct Book {
    pub name: &'static str,
    pub chapters: u16,
    pub aliases: &'static [&'static str],
}

const fn book(name: &'static str, chapters: u16, aliases: &'static [&'static str]) -> Book {
    Book {
        name,
        chapters,
        aliases,
    }
}

pub static BOOKS: [Book; 66] = [
    book("Genesis", 50, &["gen", "ge", "gn"]),
    book("Exodus", 40, &["exo", "ex", "exod"]),
    book("Leviticus", 27, &["lev", "le", "lv"]),
    book("Numbers", 36, &["num", "nu", "nm", "nb"]),
    book("Deuteronomy", 34, &["deut", "deu", "de", "dt"]),
    book("Joshua", 24, &["josh", "jos", "jsh"]),
    book("Judges", 21, &["judg", "jdg", "jg", "jdgs"]),
    book("Ruth", 4, &["rth", "ru"]),
    book("1 Samuel", 31, &["1 sam", "1 sa", "1 sm"]),
    book("2 Samuel", 24, &["2 sam", "2 sa", "2 sm"]),
    book("1 Kings", 22, &["1 kgs", "1 ki", "1 kin"]),
    book("2 Kings", 25, &["2 kgs", "2 ki", "2 kin"]),
    book("1 Chronicles", 29, &["1 chr", "1 chron", "1 ch"]),
    book("2 Chronicles", 36, &["2 chr", "2 chron", "2 ch"]),
    book("Ezra", 10, &["ezr"]),
    book("Nehemiah", 13, &["neh", "ne"]),
    book("Esther", 10, &["esth", "est", "es"]),
    book("Job", 42, &["jb"]),
    book("Psalms", 150, &["psalm", "ps", "psa", "pss", "psm", "pslm"]),
    book("Proverbs", 31, &["prov", "pro", "prv", "pr"]),
    book("Ecclesiastes", 12, &["eccl", "eccles", "ecc", "ec", "qoh"]),
    book(
        "Song of Solomon",
        8,
        &["song", "song of songs", "sos", "so", "sng", "canticles", "cant"],
    ),
    book("Isaiah", 66, &["isa", "is"]),
    book("Jeremiah", 52, &["jer", "je", "jr"]),
    book("Lamentations", 5, &["lam", "la"]),
    book("Ezekiel", 48, &["ezek", "eze", "ezk"]),
    book("Daniel", 12, &["dan", "da", "dn"]),
    book("Hosea", 14, &["hos", "ho"]),
    book("Joel", 3, &["jl"]),
    book("Amos", 9, &["am"]),
    book("Obadiah", 1, &["obad", "ob"]),
    book("Jonah", 4, &["jon", "jnh"]),
    book("Micah", 7, &["mic", "mc"]),
    book("Nahum", 3, &["nah", "na"]),
    book("Habakkuk", 3, &["hab", "hb"]),
    book("Zephaniah", 3, &["zeph", "zep", "zp"]),
    book("Haggai", 2, &["hag", "hg"]),
    book("Zechariah", 14, &["zech", "zec", "zc"]),
    book("Malachi", 4, &["mal", "ml"]),
    book("Matthew", 28, &["matt", "mat", "mt"]),
    book("Mark", 16, &["mrk", "mk", "mr"]),
    book("Luke", 24, &["luk", "lk"]),
    book("John", 21, &["jn", "jhn", "joh"]),
    book("Acts", 28, &["act", "ac", "acts of the apostles"]),
    book("Romans", 16, &["rom", "ro", "rm"]),
    book("1 Corinthians", 16, &["1 cor", "1 co"]),
    book("2 Corinthians", 13, &["2 cor", "2 co"]),
    book("Galatians", 6, &["gal", "ga"]),
    book("Ephesians", 6, &["eph", "ephes"]),
    book("Philippians", 4, &["phil", "php", "pp"]),
    book("Colossians", 4, &["col"]),
    book("1 Thessalonians", 5, &["1 thess", "1 thes", "1 th"]),
    book("2 Thessalonians", 3, &["2 thess", "2 thes", "2 th"]),
    book("1 Timothy", 6, &["1 tim", "1 ti"]),
    book("2 Timothy", 4, &["2 tim", "2 ti"]),
    book("Titus", 3, &["tit"]),
    book("Philemon", 1, &["philem", "phm", "pm"]),
    book("Hebrews", 13, &["heb"]),
    book("James", 5, &["jas", "jm"]),
    book("1 Peter", 5, &["1 pet", "1 pe", "1 pt"]),
    book("2 Peter", 3, &["2 pet", "2 pe", "2 pt"]),
    book("1 John", 5, &["1 jn", "1 jhn", "1 jo"]),
    book("2 John", 1, &["2 jn", "2 jhn", "2 jo"]),
    book("3 John", 1, &["3 jn", "3 jhn", "3 jo"]),
    book("Jude", 1, &["jud", "jd"]),
    book("Revelation", 22, &["rev", "re", "rv", "revelations", "apocalypse"]),
];

/// Lookup key -> index into [`BOOKS`], covering canonical names and aliases
static BOOK_INDEX: Lazy<HashMap<String, usize>> = Lazy::new(|| {
    let mut index = HashMap::new();
    for (i, b) in BOOKS.iter().enumerate() {
        index.insert(book_key(b.name), i);
        for alias in b.aliases {
            index.insert(book_key(alias), i);
        }
    }
    index
});

static REFERENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<book>(?:[1-3]\s*)?[a-z][a-z .]*?)\s*(?P<chapter>\d{1,3})(?:\s*[:.]\s*(?P<verse>\d{1,3}))?(?:\s*-\s*(?P<end>\d{1,3}))?$",
    )
    .expect("reference pattern should compile")
});

const FUZZY_THRESHOLD: f64 = 0.9;
const MAX_EDIT_DISTANCE: usize = 1;

/// Normalize a book name to its lookup key: "I Cor." -> "1cor"
fn book_key(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    let numbered = [
        ("iii ", "3"),
        ("ii ", "2"),
        ("i ", "1"),
        ("third ", "3"),
        ("second ", "2"),
        ("first ", "1"),
    ]
    .iter()
    .find_map(|(prefix, digit)| lower.strip_prefix(prefix).map(|rest| format!("{digit}{rest}")))
    .unwrap_or(lower);
    numbered.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

/// Resolve a free-text book name to its table entry.
///
/// Order: exact synonym, then a unique prefix of a canonical name, then a
/// unique canonical name one edit away, then the closest canonical name by
/// Jaro-Winkler similarity.
pub fn find_book(name: &str) -> Option<&'static Book> {
    let key = book_key(name);
    if key.is_empty() {
        return None;
    }
    if let Some(&i) = BOOK_INDEX.get(&key) {
        return Some(&BOOKS[i]);
    }

    let letters = key.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if letters >= 3 {
        let mut prefixed = BOOKS.iter().filter(|b| book_key(b.name).starts_with(&key));
        if let (Some(only), None) = (prefixed.next(), prefixed.next()) {
            return Some(only);
        }
    }

    if letters >= 5 {
        let mut close = BOOKS
            .iter()
            .filter(|b| strsim::damerau_levenshtein(&key, &book_key(b.name)) <= MAX_EDIT_DISTANCE);
        if let (Some(only), None) = (close.next(), close.next()) {
            tracing::debug!("Matched book '{}' to {} within one edit", name, only.name);
            return Some(only);
        }
    }

    if letters >= 4 {
        let mut best: Option<(&'static Book, f64)> = None;
        let mut tied = false;
        for b in BOOKS.iter() {
            let score = strsim::jaro_winkler(&key, &book_key(b.name));
            if score < FUZZY_THRESHOLD {
                continue;
            }
            match best {
                Some((_, top)) if (score - top).abs() < f64::EPSILON => tied = true,
                Some((_, top)) if score < top => {}
                _ => {
                    best = Some((b, score));
                    tied = false;
                }
            }
        }
        if let Some((b, score)) = best
            && !tied
        {
            tracing::debug!("Fuzzy matched book '{}' to {} ({:.3})", name, b.name, score);
            return Some(b);
        }
    }
    None
}

/// A canonical scripture citation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reference {
    pub book: &'static str,
    pub chapter: u16,
    pub verse: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verse_end: Option<u16>,
}

impl Reference {
    /// Parse a reference with the local rules only.
    pub fn parse(input: &str) -> Result<Self> {
        parse_reference(input).ok_or_else(|| InsightError::Normalization {
            input: input.to_string(),
        })
    }

    /// Canonical `Book Chapter:Verse` form.
    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}:{}", self.book, self.chapter, self.verse)?;
        if let Some(end) = self.verse_end {
            write!(f, "-{}", end)?;
        }
        Ok(())
    }
}

impl FromStr for Reference {
    type Err = InsightError;

    fn from_str(s: &str) -> Result<Self> {
        Reference::parse(s)
    }
}

/// Parse free text into a reference, or `None` when it is not one.
///
/// A chapter without a verse is rejected unless the book has one chapter,
/// where the lone number is the verse. Chapters past the end of the book,
/// verse 0 and descending ranges are rejected.
pub fn parse_reference(input: &str) -> Option<Reference> {
    let cleaned: String = input
        .nfkc()
        .map(|c| match c {
            '\u{2010}'..='\u{2015}' => '-',
            _ => c,
        })
        .collect::<String>()
        .to_lowercase();
    let cleaned = cleaned
        .trim()
        .trim_end_matches(|c: char| matches!(c, '.' | ',' | ';'))
        .trim();
    let cleaned = preprocess_ordinal(cleaned);

    let caps = REFERENCE_RE.captures(&cleaned)?;
    let book = find_book(caps.name("book")?.as_str())?;
    let first: u16 = caps.name("chapter")?.as_str().parse().ok()?;
    // One-chapter books are cited by verse alone: "Jude 3" is Jude 1:3
    let (chapter, verse) = match caps.name("verse") {
        Some(m) => (first, m.as_str().parse::<u16>().ok()?),
        None if book.chapters == 1 => (1, first),
        None => return None,
    };
    let verse_end = match caps.name("end") {
        Some(m) => Some(m.as_str().parse::<u16>().ok()?),
        None => None,
    };

    if chapter == 0 || chapter > book.chapters || verse == 0 {
        return None;
    }
    let verse_end = match verse_end {
        Some(end) if end < verse => return None,
        Some(end) if end == verse => None,
        other => other,
    };

    Some(Reference {
        book: book.name,
        chapter,
        verse,
        verse_end,
    })
}

/// Rewrite a leading roman or spelled-out ordinal so the pattern sees a digit.
fn preprocess_ordinal(s: &str) -> String {
    for (prefix, digit) in [
        ("iii ", "3 "),
        ("ii ", "2 "),
        ("i ", "1 "),
        ("third ", "3 "),
        ("second ", "2 "),
        ("first ", "1 "),
    ] {
        if let Some(rest) = s.strip_prefix(prefix) {
            return format!("{digit}{rest}");
        }
    }
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn aliases_are_unambiguous() {
        let mut seen = HashSet::new();
        for b in BOOKS.iter() {
            assert!(seen.insert(book_key(b.name)), "duplicate key for {}", b.name);
            for alias in b.aliases {
                assert!(seen.insert(book_key(alias)), "duplicate alias {alias}");
            }
        }
    }

    #[test]
    fn book_keys() {
        assert_eq!(book_key("I Cor."), "1cor");
        assert_eq!(book_key("Song of Solomon"), "songofsolomon");
        assert_eq!(book_key("second kings"), "2kings");
    }

    #[test]
    fn finds_by_prefix_and_fuzzy() {
        assert_eq!(find_book("Deuter").unwrap().name, "Deuteronomy");
        assert_eq!(find_book("Genisis").unwrap().name, "Genesis");
        assert_eq!(find_book("Jhon").unwrap().name, "John");
        assert_eq!(find_book("Mathew").unwrap().name, "Matthew");
        assert_eq!(find_book("Revelaton").unwrap().name, "Revelation");
        assert!(find_book("Hezekiah").is_none());
        // "phil" is an alias; "phi" is a prefix of two books
        assert_eq!(find_book("phil").unwrap().name, "Philippians");
        assert!(find_book("phi").is_none());
    }

    #[test]
    fn display_with_range() {
        let r = Reference {
            book: "1 Corinthians",
            chapter: 13,
            verse: 4,
            verse_end: Some(7),
        };
        assert_eq!(r.to_string(), "1 Corinthians 13:4-7");
    }

    #[test]
    fn one_chapter_books_take_a_bare_verse() {
        assert_eq!(parse_reference("Jude 3").unwrap().canonical(), "Jude 1:3");
        assert_eq!(parse_reference("phm 4-6").unwrap().canonical(), "Philemon 1:4-6");
        assert_eq!(parse_reference("Jude 1:3").unwrap().canonical(), "Jude 1:3");
        assert!(parse_reference("John 3").is_none());
        assert!(parse_reference("John 3-5").is_none());
    }

    #[test]
    fn dash_variants_are_ranges() {
        assert_eq!(
            parse_reference("Rom 8:28\u{2013}30").unwrap().canonical(),
            "Romans 8:28-30"
        );
    }
}
