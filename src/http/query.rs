//! Zero-copy parsing of a request's raw query string into `url.query_parts`.
//!
//! Order is preserved (not deduplicated by key) because the marshalling
//! envelope (see [`crate::invoke`]) reports every repeated query parameter,
//! not just the last one.

use memchr::memchr;
use std::{error, fmt};

pub struct Query;

impl Query {
    /// Appends every `key=value` pair in `query` to `result`, up to `limit`
    /// parameters. A leading `?` is stripped if present, so both `?a=1` and
    /// `a=1` parse the same way.
    #[inline]
    pub fn parse_into<'a>(
        result: &mut Vec<(&'a [u8], &'a [u8])>,
        query: &'a [u8],
        limit: usize,
    ) -> Result<(), Error> {
        let data = match query.first().ok_or(Error::Empty)? {
            b'?' => &query[1..],
            _ => query,
        };

        let mut start = 0;
        while start < data.len() {
            if result.len() >= limit {
                return Err(Error::OverLimit(limit));
            }

            let end = memchr(b'&', &data[start..])
                .map(|pos| start + pos)
                .unwrap_or(data.len());

            let index = memchr(b'=', &data[start..end]).unwrap_or(end - start);
            let split_index = start + index;

            let key = &data[start..split_index];
            let value = match split_index < end {
                true => &data[split_index + 1..end],
                false => b"",
            };

            result.push((key, value));
            start = end + 1;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The query string contained more than `limit` parameters.
    OverLimit(usize),
    /// The query string was empty or just `?`.
    Empty,
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OverLimit(limit) => write!(f, "query parameter limit exceeded: limit={limit}"),
            Error::Empty => write!(f, "query string is empty or contains no parameters"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::*;

    fn parse<'a>(query: &'a [u8], limit: usize) -> Result<Vec<(&'a [u8], &'a [u8])>, Error> {
        let mut result = Vec::new();
        Query::parse_into(&mut result, query, limit)?;
        Ok(result)
    }

    #[test]
    fn basic() {
        for line in ["a=1&b=2", "?a=1&b=2"] {
            let params = parse(line.as_bytes(), 8).unwrap();
            assert_eq!(params.len(), 2);
            assert_eq!(str_2(params[0]), ("a", "1"));
            assert_eq!(str_2(params[1]), ("b", "2"));
        }
    }

    #[test]
    fn repeated_keys_are_kept_in_order_not_deduplicated() {
        let params = parse(b"code=1&code=2", 8).unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(str_2(params[0]), ("code", "1"));
        assert_eq!(str_2(params[1]), ("code", "2"));
    }

    #[test]
    fn full() {
        let line = b"flag&empty=&=val&&key=value";
        let params = parse(line, 10).unwrap();

        assert_eq!(params.len(), 5);
        assert_eq!(str_2(params[0]), ("flag", ""));
        assert_eq!(str_2(params[1]), ("empty", ""));
        assert_eq!(str_2(params[2]), ("", "val"));
        assert_eq!(str_2(params[3]), ("", ""));
        assert_eq!(str_2(params[4]), ("key", "value"));
    }

    #[test]
    fn limit_error() {
        assert_eq!(parse(b"a&a", 1), Err(Error::OverLimit(1)));
    }

    #[test]
    fn empty_error() {
        assert_eq!(parse(b"", 10), Err(Error::Empty));
    }
}
