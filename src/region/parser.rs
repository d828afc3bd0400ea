use super::{RegionDef, RegionError};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{anychar, multispace0, space0, space1},
    combinator::{map_res, verify},
    error::{context, convert_error},
    multi::{many1, separated_nonempty_list},
    sequence::{delimited, preceded},
    Err as NomErr,
};
use std::str::FromStr;

pub type ParseError<'a> = nom::error::VerboseError<&'a str>;

pub type ParseResult<'a, T> = nom::IResult<&'a str, T, ParseError<'a>>;

pub fn rawuint(input: &str) -> ParseResult<&str> {
    take_while1(|c: char| c.is_digit(10))(input)
}

pub fn ms_position(input: &str) -> ParseResult<u32> {
    map_res(rawuint, u32::from_str)(input)
}

pub fn region_name(input: &str) -> ParseResult<char> {
    context(
        "Region name",
        verify(anychar, |c: &char| c.is_ascii_alphabetic()),
    )(input)
}

/// `a:0-1000`
pub fn region_def(input: &str) -> ParseResult<RegionDef> {
    let (input, name) = region_name(input)?;
    let (input, _) = delimited(space0, tag(":"), space0)(input)?;
    let (input, start_ms) = context("Region start", ms_position)(input)?;
    let (input, _) = delimited(space0, tag("-"), space0)(input)?;
    let (input, end_ms) = context("Region end", ms_position)(input)?;
    Ok((input, RegionDef::new(name, start_ms, end_ms)))
}

fn list_separator(input: &str) -> ParseResult<&str> {
    alt((delimited(space0, tag(","), space0), space1))(input)
}

pub fn region_defs(input: &str) -> ParseResult<Vec<RegionDef>> {
    let (input, _) = multispace0(input)?;
    let (input, res) = context(
        "Region definition list",
        separated_nonempty_list(list_separator, region_def),
    )(input)?;
    let (input, _) = multispace0(input)?;
    Ok((input, res))
}

pub fn region_names(input: &str) -> ParseResult<Vec<char>> {
    let (input, res) = context(
        "Region sequence",
        many1(preceded(multispace0, region_name)),
    )(input)?;
    let (input, _) = multispace0(input)?;
    Ok((input, res))
}

fn run_parser<'a, T>(
    input: &'a str,
    parser: impl Fn(&'a str) -> ParseResult<'a, T>,
) -> Result<T, RegionError> {
    let (rest, res) = parser(input).map_err(|e| match e {
        NomErr::Error(e) | NomErr::Failure(e) => RegionError::Parse(convert_error(input, e)),
        NomErr::Incomplete(ic) => RegionError::Parse(format!("Incomplete: {:?}", ic)),
    })?;
    if !rest.is_empty() {
        return Err(RegionError::Parse(format!(
            "Could not parse the full input; rest: {:?}",
            rest
        )));
    }
    Ok(res)
}

/// Parses region definitions such as `"a:0-1000, b:1000-2000"`.
pub fn parse_region_defs(input: &str) -> Result<Vec<RegionDef>, RegionError> {
    run_parser(input, region_defs)
}

/// Parses a region name sequence such as `"aabada"`.
/// An input holding only whitespace is an empty sequence.
pub fn parse_region_sequence(input: &str) -> Result<Vec<char>, RegionError> {
    if input.trim().is_empty() {
        return Ok(Vec::new());
    }
    run_parser(input, region_names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_defs() {
        assert_eq!(
            vec![RegionDef::new('a', 0, 1000), RegionDef::new('b', 1000, 2500)],
            parse_region_defs("a:0-1000, b : 1000 - 2500").unwrap()
        );
        assert_eq!(
            vec![RegionDef::new('a', 0, 10), RegionDef::new('c', 10, 20)],
            parse_region_defs(" a:0-10 c:10-20\n").unwrap()
        );
        assert!(parse_region_defs("a:0-").is_err());
        assert!(parse_region_defs("a:0-10 ?").is_err());
        assert!(parse_region_defs("").is_err());
    }

    #[test]
    fn test_region_sequence() {
        assert_eq!(
            vec!['a', 'a', 'b', 'a', 'd', 'a'],
            parse_region_sequence("aabada").unwrap()
        );
        assert_eq!(vec!['a', 'b'], parse_region_sequence(" a b ").unwrap());
        assert_eq!(Vec::<char>::new(), parse_region_sequence("").unwrap());
        assert!(parse_region_sequence("ab3").is_err());
    }
}
