use std::fmt;

use crate::registry::Vnum;
use crate::zone::Opcode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneFileErrorCode {
    Malformed,
    UnknownOpcode,
    InvalidValue,
    MissingTerminator,
    MissingHeader,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneFileError {
    pub code: ZoneFileErrorCode,
    pub message: String,
    /// 1-based; 0 when the error is not tied to a line.
    pub line: u32,
}

impl fmt::Display for ZoneFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            write!(f, "{:?}: {}", self.code, self.message)
        } else {
            write!(f, "{:?}: {} (line={})", self.code, self.message, self.line)
        }
    }
}

impl std::error::Error for ZoneFileError {}

/// Zone header exactly as it sits on disk. `extra` keeps any trailing integers
/// after the reset mode so they survive a rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneFileHeader {
    pub number: Vnum,
    pub name: String,
    pub top: Vnum,
    pub lifespan: i32,
    pub reset_mode: i32,
    pub extra: Vec<i32>,
}

/// One reset line with vnum operands. `F` lines carry the mob vnum in
/// `args[0]` and the command in `text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneRecord {
    pub opcode: Opcode,
    pub conditional: bool,
    pub args: [i32; 3],
    pub text: Option<String>,
    pub comment: Option<String>,
    pub line: u32,
}

impl ZoneRecord {
    pub fn new(opcode: Opcode, conditional: bool, args: [i32; 3]) -> Self {
        Self {
            opcode,
            conditional,
            args,
            text: None,
            comment: None,
            line: 0,
        }
    }

    pub fn force(conditional: bool, mob: Vnum, text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::new(Opcode::ForceMobCommand, conditional, [mob, 0, 0])
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = line;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneFile {
    pub header: ZoneFileHeader,
    pub records: Vec<ZoneRecord>,
}

pub fn decode_zone_file(raw: &str) -> Result<ZoneFile, ZoneFileError> {
    let mut lines = raw
        .lines()
        .enumerate()
        .map(|(index, text)| (index as u32 + 1, text.trim_end_matches('\r')))
        .filter(|(_, text)| !text.trim().is_empty() && !text.starts_with('*'));

    let header = decode_header(&mut lines)?;
    let mut records = Vec::new();
    for (line, text) in lines.by_ref() {
        let text = text.trim_start();
        if text == "S" {
            return Ok(ZoneFile { header, records });
        }
        if text == "$" {
            break;
        }
        records.push(decode_record(line, text)?);
    }

    Err(error(
        ZoneFileErrorCode::MissingTerminator,
        "reset list is not terminated by an 'S' line".to_string(),
        0,
    ))
}

pub fn encode_zone_file(file: &ZoneFile) -> String {
    let header = &file.header;
    let mut out = format!("#{}\n{}~\n{} {} {}", header.number, header.name, header.top, header.lifespan, header.reset_mode);
    for value in &header.extra {
        out.push_str(&format!(" {value}"));
    }
    out.push('\n');
    for record in &file.records {
        out.push_str(&encode_record(record));
        out.push('\n');
    }
    out.push_str("S\n$\n");
    out
}

pub fn encode_record(record: &ZoneRecord) -> String {
    let code = record.opcode.code();
    let flag = u8::from(record.conditional);
    if record.opcode == Opcode::ForceMobCommand {
        return format!(
            "{code} {flag} {} {}",
            record.args[0],
            record.text.as_deref().unwrap_or_default()
        );
    }
    let [a1, a2, a3] = record.args;
    match &record.comment {
        Some(comment) => format!("{code} {flag} {a1} {a2} {a3} \t({comment})"),
        None => format!("{code} {flag} {a1} {a2} {a3}"),
    }
}

/// Parses a single reset line in on-disk syntax.
pub fn decode_record(line: u32, text: &str) -> Result<ZoneRecord, ZoneFileError> {
    let text = text.trim();
    let mut chars = text.chars();
    let Some(code) = chars.next() else {
        return Err(error(ZoneFileErrorCode::Malformed, "empty reset line".to_string(), line));
    };
    let opcode = Opcode::from_code(code).ok_or_else(|| {
        error(
            ZoneFileErrorCode::UnknownOpcode,
            format!("unknown reset command '{code}'"),
            line,
        )
    })?;

    let rest = chars.as_str();
    if !rest.starts_with(char::is_whitespace) {
        return Err(error(
            ZoneFileErrorCode::Malformed,
            format!("expected whitespace after '{code}'"),
            line,
        ));
    }

    if opcode == Opcode::ForceMobCommand {
        let (flag, rest) = split_token(rest);
        let (mob, rest) = split_token(rest);
        let conditional = parse_flag(flag, line)?;
        let mob = parse_int(mob, "mob vnum", line)?;
        let command = rest.trim();
        if command.is_empty() {
            return Err(error(
                ZoneFileErrorCode::Malformed,
                "'F' line has no command text".to_string(),
                line,
            ));
        }
        return Ok(ZoneRecord::force(conditional, mob, command).with_line(line));
    }

    let (flag, rest) = split_token(rest);
    let conditional = parse_flag(flag, line)?;
    let mut args = [0; 3];
    let mut rest = rest;
    for (index, slot) in args.iter_mut().enumerate() {
        let (token, tail) = split_token(rest);
        *slot = parse_int(token, ARG_NAMES[index], line)?;
        rest = tail;
    }

    let tail = rest.trim();
    let comment = tail
        .strip_prefix('(')
        .and_then(|inner| inner.strip_suffix(')'))
        .map(str::to_string);

    Ok(ZoneRecord {
        opcode,
        conditional,
        args,
        text: None,
        comment,
        line,
    })
}

const ARG_NAMES: [&str; 3] = ["first operand", "second operand", "third operand"];

fn decode_header<'a>(
    lines: &mut impl Iterator<Item = (u32, &'a str)>,
) -> Result<ZoneFileHeader, ZoneFileError> {
    let Some((line, number_line)) = lines.next() else {
        return Err(error(ZoneFileErrorCode::MissingHeader, "file is empty".to_string(), 0));
    };
    let number = number_line
        .trim()
        .strip_prefix('#')
        .ok_or_else(|| {
            error(
                ZoneFileErrorCode::MissingHeader,
                "first line must be '#<zone number>'".to_string(),
                line,
            )
        })
        .and_then(|digits| parse_int(digits, "zone number", line))?;

    let Some((line, name_line)) = lines.next() else {
        return Err(error(ZoneFileErrorCode::MissingHeader, "missing zone name line".to_string(), line));
    };
    let name = name_line
        .strip_suffix('~')
        .ok_or_else(|| {
            error(
                ZoneFileErrorCode::MissingHeader,
                "zone name must end with '~'".to_string(),
                line,
            )
        })?
        .to_string();

    let Some((line, values_line)) = lines.next() else {
        return Err(error(
            ZoneFileErrorCode::MissingHeader,
            "missing '<top> <lifespan> <reset mode>' line".to_string(),
            line,
        ));
    };
    let values = values_line
        .split_whitespace()
        .map(|token| parse_int(token, "header value", line))
        .collect::<Result<Vec<_>, _>>()?;
    let [top, lifespan, reset_mode, extra @ ..] = values.as_slice() else {
        return Err(error(
            ZoneFileErrorCode::MissingHeader,
            format!("expected at least 3 header values, found {}", values.len()),
            line,
        ));
    };

    Ok(ZoneFileHeader {
        number,
        name,
        top: *top,
        lifespan: *lifespan,
        reset_mode: *reset_mode,
        extra: extra.to_vec(),
    })
}

fn split_token(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.find(char::is_whitespace) {
        Some(end) => (&text[..end], &text[end..]),
        None => (text, ""),
    }
}

fn parse_flag(token: &str, line: u32) -> Result<bool, ZoneFileError> {
    match token {
        "0" => Ok(false),
        "1" => Ok(true),
        "" => Err(error(ZoneFileErrorCode::Malformed, "missing if-flag".to_string(), line)),
        other => Err(error(
            ZoneFileErrorCode::InvalidValue,
            format!("if-flag must be 0 or 1, found '{other}'"),
            line,
        )),
    }
}

fn parse_int(token: &str, what: &str, line: u32) -> Result<i32, ZoneFileError> {
    if token.is_empty() {
        return Err(error(ZoneFileErrorCode::Malformed, format!("missing {what}"), line));
    }
    token.parse::<i32>().map_err(|_| {
        error(
            ZoneFileErrorCode::InvalidValue,
            format!("{what} '{token}' is not an integer"),
            line,
        )
    })
}

fn error(code: ZoneFileErrorCode, message: String, line: u32) -> ZoneFileError {
    ZoneFileError { code, message, line }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANONICAL: &str = "#30\nNorthern Highway~\n3099 15 2 0 1 3\n\
M 0 3005 2 3001 \t(a cityguard)\n\
E 1 3022 99 16 \t(a long sword)\n\
G 1 3010 5 -1 \t(a loaf of bread)\n\
O 0 3020 1 -1 \t(a wooden chest)\n\
P 1 3021 3 3020 \t(a torch)\n\
R 0 3001 3021 -1 \t(a torch)\n\
D 0 3001 2 1 \t(The Temple)\n\
F 0 3005 say Halt!\n\
S\n$\n";

    #[test]
    fn canonical_text_round_trips_for_every_opcode() {
        let file = decode_zone_file(CANONICAL).expect("decode");
        let opcodes = file
            .records
            .iter()
            .map(|record| record.opcode.code())
            .collect::<String>();
        assert_eq!(opcodes, "MEGOPRDF");
        assert_eq!(encode_zone_file(&file), CANONICAL);
    }

    #[test]
    fn decode_reads_operands_comments_and_lines() {
        let file = decode_zone_file(CANONICAL).expect("decode");
        assert_eq!(file.header.number, 30);
        assert_eq!(file.header.name, "Northern Highway");
        assert_eq!(file.header.extra, vec![0, 1, 3]);

        let equip = &file.records[1];
        assert!(equip.conditional);
        assert_eq!(equip.args, [3022, 99, 16]);
        assert_eq!(equip.comment.as_deref(), Some("a long sword"));
        assert_eq!(equip.line, 5);

        let force = &file.records[7];
        assert_eq!(force.args[0], 3005);
        assert_eq!(force.text.as_deref(), Some("say Halt!"));
    }

    #[test]
    fn star_comments_and_blank_lines_are_skipped() {
        let raw = "#1\nTest~\n199 5 1\n* M (Mobile) Mob-Vnum Wld-Max Room-Vnum\n\nM 0 100 1 101\nS\n";
        let file = decode_zone_file(raw).expect("decode");
        assert_eq!(file.records.len(), 1);
        assert_eq!(file.records[0].line, 6);
        assert_eq!(file.records[0].comment, None);
    }

    #[test]
    fn unknown_opcode_reports_line() {
        let raw = "#1\nTest~\n199 5 1\nM 0 100 1 101\nX 0 1 2 3\nS\n";
        let err = decode_zone_file(raw).expect_err("unknown opcode");
        assert_eq!(err.code, ZoneFileErrorCode::UnknownOpcode);
        assert_eq!(err.line, 5);
    }

    #[test]
    fn bad_operands_are_rejected() {
        let err = decode_record(7, "M 0 abc 1 3001").expect_err("non-integer");
        assert_eq!(err.code, ZoneFileErrorCode::InvalidValue);
        assert_eq!(err.line, 7);

        let err = decode_record(8, "O 2 3020 1 3001").expect_err("flag");
        assert_eq!(err.code, ZoneFileErrorCode::InvalidValue);

        let err = decode_record(9, "G 1 3010").expect_err("short");
        assert_eq!(err.code, ZoneFileErrorCode::Malformed);

        let err = decode_record(10, "F 0 3005   ").expect_err("no text");
        assert_eq!(err.code, ZoneFileErrorCode::Malformed);
    }

    #[test]
    fn missing_terminator_and_header_are_distinct() {
        let err = decode_zone_file("#1\nTest~\n199 5 1\nM 0 100 1 101\n").expect_err("no S");
        assert_eq!(err.code, ZoneFileErrorCode::MissingTerminator);

        let err = decode_zone_file("1\nTest~\n199 5 1\nS\n").expect_err("no #");
        assert_eq!(err.code, ZoneFileErrorCode::MissingHeader);
        assert_eq!(err.line, 1);

        let err = decode_zone_file("#1\nTest\n199 5 1\nS\n").expect_err("no ~");
        assert_eq!(err.code, ZoneFileErrorCode::MissingHeader);
        assert_eq!(err.line, 2);

        let err = decode_zone_file("#1\nTest~\n199 5\nS\n").expect_err("short header");
        assert_eq!(err.code, ZoneFileErrorCode::MissingHeader);
    }
}
