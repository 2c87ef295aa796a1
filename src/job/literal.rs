//! Python-style list literals stored in INI job files, e.g. `['Code', "Name"]`,
//! `[None, 3]` or `[None, 0, 'Sheet1']`. Only these shapes are accepted.

use crate::job::SheetSelector;
use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::bytes::complete::take_while_m_n;
use nom::character::complete::char;
use nom::character::complete::digit1;
use nom::character::complete::multispace0;
use nom::character::complete::none_of;
use nom::combinator::all_consuming;
use nom::combinator::map;
use nom::combinator::map_opt;
use nom::combinator::map_res;
use nom::combinator::opt;
use nom::combinator::value;
use nom::multi::fold_many0;
use nom::multi::separated_list0;
use nom::sequence::delimited;
use nom::sequence::pair;
use nom::sequence::preceded;
use nom::sequence::terminated;
use nom::Finish;
use nom::IResult;

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn hex_char<'a>(digits: usize) -> impl FnMut(&'a str) -> IResult<&'a str, char> {
    map_opt(
        take_while_m_n(digits, digits, |c: char| c.is_ascii_hexdigit()),
        |hex: &str| u32::from_str_radix(hex, 16).ok().and_then(char::from_u32),
    )
}

fn escape(input: &str) -> IResult<&str, char> {
    alt((
        value('\\', char('\\')),
        value('\'', char('\'')),
        value('"', char('"')),
        value('\n', char('n')),
        value('\t', char('t')),
        value('\r', char('r')),
        value('\0', char('0')),
        preceded(char('x'), hex_char(2)),
        preceded(char('u'), hex_char(4)),
        preceded(char('U'), hex_char(8)),
    ))(input)
}

fn quoted<'a>(quote: char, stop: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, String> {
    delimited(
        char(quote),
        fold_many0(
            alt((preceded(char('\\'), escape), none_of(stop))),
            String::new,
            |mut text, c| {
                text.push(c);
                text
            },
        ),
        char(quote),
    )
}

fn string(input: &str) -> IResult<&str, String> {
    alt((quoted('\'', "'\\"), quoted('"', "\"\\")))(input)
}

fn integer(input: &str) -> IResult<&str, usize> {
    map_res(digit1, str::parse::<usize>)(input)
}

fn optional_integer(input: &str) -> IResult<&str, Option<usize>> {
    alt((value(None, tag("None")), map(integer, Some)))(input)
}

fn sheet_selector(input: &str) -> IResult<&str, SheetSelector> {
    alt((
        value(SheetSelector::All, tag("None")),
        map(integer, SheetSelector::Index),
        map(string, SheetSelector::Name),
    ))(input)
}

/// `[item, item, ...]` with an optional trailing comma.
fn list<'a, O, F>(item: F) -> impl FnMut(&'a str) -> IResult<&'a str, Vec<O>>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(
        pair(char('['), multispace0),
        terminated(separated_list0(char(','), ws(item)), opt(char(','))),
        pair(multispace0, char(']')),
    )
}

fn parse_list<'a, O, F>(input: &'a str, item: F) -> Result<Vec<O>, String>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    all_consuming(ws(list(item)))(input)
        .finish()
        .map(|(_, items)| items)
        .map_err(|error| format!("unexpected input at '{}'", preview(error.input)))
}

fn preview(input: &str) -> String {
    input.chars().take(20).collect()
}

pub(crate) fn parse_strings(input: &str) -> Result<Vec<String>, String> {
    parse_list(input, string)
}

pub(crate) fn parse_optional_integers(input: &str) -> Result<Vec<Option<usize>>, String> {
    parse_list(input, optional_integer)
}

pub(crate) fn parse_sheet_selectors(input: &str) -> Result<Vec<SheetSelector>, String> {
    parse_list(input, sheet_selector)
}

/// Quotes like Python's `repr(str)`: double quotes only when the text has a single quote and no double quote.
pub(crate) fn quote(text: &str) -> String {
    let delimiter = if text.contains('\'') && !text.contains('"') { '"' } else { '\'' };
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push(delimiter);
    for c in text.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\t' => quoted.push_str("\\t"),
            '\r' => quoted.push_str("\\r"),
            c if c == delimiter => {
                quoted.push('\\');
                quoted.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7F => quoted.push_str(&format!("\\x{:02x}", c as u32)),
            c => quoted.push(c),
        }
    }
    quoted.push(delimiter);
    quoted
}

fn format_list<I: IntoIterator<Item = String>>(items: I) -> String {
    format!("[{}]", items.into_iter().collect::<Vec<_>>().join(", "))
}

pub(crate) fn format_strings<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    format_list(items.into_iter().map(|item| quote(item.as_ref())))
}

pub(crate) fn format_optional_integers(items: &[Option<usize>]) -> String {
    format_list(items.iter().map(|item| match item {
        Some(value) => value.to_string(),
        None => "None".to_owned(),
    }))
}

pub(crate) fn format_sheet_selectors(items: &[SheetSelector]) -> String {
    format_list(items.iter().map(|item| match item {
        SheetSelector::Name(name) => quote(name),
        other => other.to_string(),
    }))
}
