use super::BuiltinCommand;
use crate::command::{CommandOutput, ExitCode};
use crate::env::Environment;
use anyhow::{Result, bail};
use argh::FromArgs;
use std::io::{BufRead, Write};

#[derive(FromArgs)]
/// print selected fields of each line read from standard input.
pub struct Cut {
    #[argh(option, short = 'd')]
    /// field delimiter, a single character. Defaults to TAB.
    pub delimiter: Option<String>,

    #[argh(option, short = 'f')]
    /// comma separated list of 1-based field numbers to print.
    pub fields: Option<String>,
}

impl Cut {
    fn delimiter(&self) -> Result<char> {
        match &self.delimiter {
            None => Ok('\t'),
            Some(d) => match d.chars().next() {
                Some(c) => Ok(c),
                None => bail!("the delimiter must be a single character"),
            },
        }
    }

    /// Zero-based indices of the requested fields, in the order given.
    ///
    /// Each list entry contributes its leading digits; entries without any, or
    /// naming field 0, select nothing.
    fn field_indices(list: &str) -> Vec<usize> {
        list.split(',')
            .filter_map(|entry| {
                let digits: String = entry
                    .trim()
                    .chars()
                    .take_while(|c| c.is_ascii_digit())
                    .collect();
                digits.parse::<usize>().ok()
            })
            .filter(|&field| field > 0)
            .map(|field| field - 1)
            .collect()
    }
}

impl BuiltinCommand for Cut {
    fn name() -> &'static str {
        "cut"
    }

    /// Splits the attached forms `-d,` and `-f1,3` into option and value.
    fn normalize_args(args: &[&str]) -> Vec<String> {
        let mut normalized = Vec::with_capacity(args.len());
        for arg in args {
            match (arg.get(..2), arg.get(2..)) {
                (Some(flag @ ("-d" | "-f")), Some(value)) if !value.is_empty() => {
                    normalized.push(flag.to_string());
                    normalized.push(value.to_string());
                }
                _ => normalized.push(arg.to_string()),
            }
        }
        normalized
    }

    fn execute(
        self,
        stdin: &mut dyn BufRead,
        stdout: &mut dyn CommandOutput,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        let delimiter = self.delimiter()?;
        let fields = self.fields.as_deref().map(Cut::field_indices);

        let mut buf = [0u8; 4];
        let separator: &str = delimiter.encode_utf8(&mut buf);

        for line in stdin.lines() {
            let line = line?;
            let tokens: Vec<&str> = line.split(delimiter).filter(|t| !t.is_empty()).collect();
            let Some(fields) = &fields else {
                continue;
            };
            if tokens.is_empty() {
                continue;
            }

            let selected: Vec<&str> = fields
                .iter()
                .filter_map(|&index| tokens.get(index).copied())
                .collect();
            writeln!(stdout, "{}", selected.join(separator))?;
            stdout.flush()?;
        }
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn run(args: &[&str], input: &str) -> (ExitCode, String) {
        let normalized = Cut::normalize_args(args);
        let normalized: Vec<&str> = normalized.iter().map(String::as_str).collect();
        let cut = Cut::from_args(&["cut"], &normalized).expect("valid arguments");

        let mut env = Environment::new();
        let mut out = Vec::new();
        let code = cut
            .execute(&mut Cursor::new(input.as_bytes().to_vec()), &mut out, &mut env)
            .expect("cut runs");
        (code, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_cut_selects_fields_in_list_order() {
        let (code, out) = run(&["-d", ",", "-f", "3,1"], "a,b,c\nd,e,f\n");
        assert_eq!(code, 0);
        assert_eq!(out, "c,a\nf,d\n");
    }

    #[test]
    fn test_cut_accepts_attached_option_values() {
        let (_, out) = run(&["-d:", "-f2"], "root:x:0\n");
        assert_eq!(out, "x\n");
    }

    #[test]
    fn test_cut_defaults_to_tab() {
        let (_, out) = run(&["-f", "2"], "one\ttwo\tthree\n");
        assert_eq!(out, "two\n");
    }

    #[test]
    fn test_cut_collapses_repeated_delimiters() {
        let (_, out) = run(&["-d", " ", "-f", "2"], "a   b c\n");
        assert_eq!(out, "b\n");
    }

    #[test]
    fn test_cut_skips_missing_and_invalid_fields() {
        let (_, out) = run(&["-d", ",", "-f", "0,x,2,9"], "a,b\n");
        assert_eq!(out, "b\n");

        let (_, out) = run(&["-d", ",", "-f", "9"], "a,b\n");
        assert_eq!(out, "\n");
    }

    #[test]
    fn test_cut_without_fields_prints_nothing() {
        let (code, out) = run(&["-d", ","], "a,b\nc,d\n");
        assert_eq!(code, 0);
        assert_eq!(out, "");
    }

    #[test]
    fn test_cut_skips_empty_lines() {
        let (_, out) = run(&["-d", ",", "-f", "1"], "a,b\n\nc\n");
        assert_eq!(out, "a\nc\n");
    }

    #[test]
    fn test_empty_delimiter_is_an_error() {
        let cut = Cut {
            delimiter: Some(String::new()),
            fields: Some("1".to_string()),
        };
        let mut env = Environment::new();
        let res = cut.execute(&mut Cursor::new(b"a\n".to_vec()), &mut Vec::new(), &mut env);
        assert!(res.is_err());
    }
}
