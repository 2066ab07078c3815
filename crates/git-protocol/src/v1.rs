//! Protocol v1 message sequences: ref advertisement, `upload-pack`
//! want/have negotiation, and `receive-pack` ref-update/report-status.

use bstr::BString;
use git_hash::Oid;

use crate::capability::Capabilities;
use crate::pktline::{PktLine, PktLineReader, PktLineWriter};
use crate::ProtocolError;

fn strip_newline(data: &[u8]) -> &[u8] {
    if data.last() == Some(&b'\n') {
        &data[..data.len() - 1]
    } else {
        data
    }
}

/// Write the initial ref advertisement: `<oid> <refname>` lines, the first
/// one carrying the NUL-separated capability list, terminated by a flush.
pub fn write_ref_advertisement<W: std::io::Write>(
    writer: &mut PktLineWriter<W>,
    refs: &[(Oid, &str)],
    capabilities: &[String],
) -> Result<(), ProtocolError> {
    if refs.is_empty() {
        // An empty repository still advertises a capability line, pinned to
        // the zero OID under the literal name `capabilities^{}`.
        let line = format!("{} capabilities^{{}}\0{}", Oid::NULL, capabilities.join(" "));
        writer.write_text(&line)?;
        writer.write_flush()?;
        return Ok(());
    }

    for (i, (oid, name)) in refs.iter().enumerate() {
        if i == 0 && !capabilities.is_empty() {
            writer.write_text(&format!("{oid} {name}\0{}", capabilities.join(" ")))?;
        } else {
            writer.write_text(&format!("{oid} {name}"))?;
        }
    }
    writer.write_flush()?;
    Ok(())
}

/// Parse a ref advertisement written by [`write_ref_advertisement`].
pub fn parse_ref_advertisement<R: std::io::Read>(
    reader: &mut PktLineReader<R>,
) -> Result<(Vec<(Oid, BString)>, Capabilities), ProtocolError> {
    let mut refs = Vec::new();
    let mut capabilities = Capabilities::default();
    let mut first_line = true;

    loop {
        match reader.read_pkt()? {
            PktLine::Flush => break,
            PktLine::Data(data) => {
                let line = strip_newline(&data);

                let line = if first_line {
                    first_line = false;
                    if let Some(nul_pos) = line.iter().position(|&b| b == 0) {
                        let ref_part = &line[..nul_pos];
                        let caps_str = String::from_utf8_lossy(&line[nul_pos + 1..]);
                        capabilities = Capabilities::parse(&caps_str);
                        ref_part
                    } else {
                        line
                    }
                } else {
                    line
                };

                parse_ref_line(line, &mut refs)?;
            }
        }
    }

    Ok((refs, capabilities))
}

fn parse_ref_line(line: &[u8], refs: &mut Vec<(Oid, BString)>) -> Result<(), ProtocolError> {
    if line.is_empty() {
        return Ok(());
    }

    let space_pos = line
        .iter()
        .position(|&b| b == b' ')
        .ok_or_else(|| ProtocolError::Protocol(format!("invalid ref line (no space): {}", String::from_utf8_lossy(line))))?;

    let oid_hex = &line[..space_pos];
    let refname = &line[space_pos + 1..];

    if refname == b"capabilities^{}" {
        // Placeholder line advertised by an empty repository; not a real ref.
        return Ok(());
    }

    let oid_str = std::str::from_utf8(oid_hex).map_err(|_| ProtocolError::Protocol("invalid UTF-8 in OID".into()))?;
    let oid = Oid::from_hex(oid_str).map_err(|e| ProtocolError::Protocol(format!("invalid OID in ref advertisement: {e}")))?;

    refs.push((oid, BString::from(refname)));
    Ok(())
}

// --- upload-pack negotiation (want/have/done, NAK/ACK) ---

/// Server's response to the negotiation round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationResult {
    /// No common objects; server will send a full pack.
    Nak,
    /// Server acknowledged a common object and is ready to send the pack.
    AckReady(Oid),
}

/// Client side: send `want <oid>` lines (capabilities on the first) then a
/// flush, followed by `have <oid>` lines and `done`.
pub fn send_wants_haves_done<W: std::io::Write>(
    writer: &mut PktLineWriter<W>,
    wants: &[Oid],
    haves: &[Oid],
    client_caps: &[String],
) -> Result<(), ProtocolError> {
    for (i, want) in wants.iter().enumerate() {
        if i == 0 && !client_caps.is_empty() {
            writer.write_text(&format!("want {want} {}", client_caps.join(" ")))?;
        } else {
            writer.write_text(&format!("want {want}"))?;
        }
    }
    writer.write_flush()?;

    for have in haves {
        writer.write_text(&format!("have {have}"))?;
    }
    writer.write_text("done")?;
    writer.flush()?;
    Ok(())
}

/// Client side: read the server's `NAK`/`ACK ... ready` response.
pub fn read_negotiation_result<R: std::io::Read>(reader: &mut PktLineReader<R>) -> Result<NegotiationResult, ProtocolError> {
    loop {
        match reader.read_pkt()? {
            PktLine::Data(data) => {
                let line = String::from_utf8_lossy(strip_newline(&data)).into_owned();
                if line == "NAK" {
                    return Ok(NegotiationResult::Nak);
                }
                if let Some(rest) = line.strip_prefix("ACK ") {
                    let oid_hex = rest.split(' ').next().unwrap_or(rest);
                    let oid = Oid::from_hex(oid_hex).map_err(|e| ProtocolError::Protocol(format!("invalid OID in ACK: {e}")))?;
                    if rest.contains("ready") {
                        return Ok(NegotiationResult::AckReady(oid));
                    }
                    continue;
                }
                return Err(ProtocolError::Protocol(format!("unexpected negotiation response: {line}")));
            }
            PktLine::Flush => return Ok(NegotiationResult::Nak),
        }
    }
}

/// Server side: read `want <oid>` lines up to the flush, returning the
/// wanted OIDs and the capability list carried on the first line.
pub fn read_wants<R: std::io::Read>(reader: &mut PktLineReader<R>) -> Result<(Vec<Oid>, Capabilities), ProtocolError> {
    let mut wants = Vec::new();
    let mut capabilities = Capabilities::default();
    let mut first_line = true;

    for data in reader.read_until_flush()? {
        let line = strip_newline(&data);
        let rest = line
            .strip_prefix(b"want ")
            .ok_or_else(|| ProtocolError::Protocol(format!("expected 'want' line, got: {}", String::from_utf8_lossy(line))))?;

        let (oid_part, caps_part) = match rest.iter().position(|&b| b == b' ') {
            Some(pos) if first_line => (&rest[..pos], Some(&rest[pos + 1..])),
            _ => (rest, None),
        };
        if first_line {
            first_line = false;
            if let Some(caps) = caps_part {
                capabilities = Capabilities::parse(&String::from_utf8_lossy(caps));
            }
        }

        let oid_str = std::str::from_utf8(oid_part).map_err(|_| ProtocolError::Protocol("invalid UTF-8 in want OID".into()))?;
        wants.push(Oid::from_hex(oid_str)?);
    }

    Ok((wants, capabilities))
}

/// Server side: read `have <oid>` lines up to and including `done`.
/// Returns the haves and whether `done` was received.
pub fn read_haves<R: std::io::Read>(reader: &mut PktLineReader<R>) -> Result<(Vec<Oid>, bool), ProtocolError> {
    let mut haves = Vec::new();
    loop {
        match reader.read_pkt()? {
            PktLine::Flush => return Ok((haves, false)),
            PktLine::Data(data) => {
                let line = strip_newline(&data);
                if line == b"done" {
                    return Ok((haves, true));
                }
                let oid_part = line
                    .strip_prefix(b"have ")
                    .ok_or_else(|| ProtocolError::Protocol(format!("expected 'have' or 'done' line, got: {}", String::from_utf8_lossy(line))))?;
                let oid_str = std::str::from_utf8(oid_part).map_err(|_| ProtocolError::Protocol("invalid UTF-8 in have OID".into()))?;
                haves.push(Oid::from_hex(oid_str)?);
            }
        }
    }
}

/// Server side: write `NAK`.
pub fn write_nak<W: std::io::Write>(writer: &mut PktLineWriter<W>) -> Result<(), ProtocolError> {
    writer.write_text("NAK")
}

/// Server side: write `ACK <oid> ready`.
pub fn write_ack_ready<W: std::io::Write>(writer: &mut PktLineWriter<W>, oid: Oid) -> Result<(), ProtocolError> {
    writer.write_text(&format!("ACK {oid} ready"))
}

// --- receive-pack (ref-update commands, report-status) ---

/// A single ref update command: `<old> <new> <ref>`. `old`/`new` use
/// [`Oid::NULL`] (40 zeros) to mean "ref does not exist".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdateCommand {
    pub old: Oid,
    pub new: Oid,
    pub name: BString,
}

impl RefUpdateCommand {
    pub fn is_create(&self) -> bool {
        self.old.is_null() && !self.new.is_null()
    }

    pub fn is_delete(&self) -> bool {
        !self.old.is_null() && self.new.is_null()
    }
}

/// Client side: write update commands (capabilities on the first line)
/// followed by a flush.
pub fn write_commands<W: std::io::Write>(
    writer: &mut PktLineWriter<W>,
    commands: &[RefUpdateCommand],
    client_caps: &[String],
) -> Result<(), ProtocolError> {
    for (i, cmd) in commands.iter().enumerate() {
        if i == 0 && !client_caps.is_empty() {
            writer.write_text(&format!("{} {} {}\0{}", cmd.old, cmd.new, cmd.name, client_caps.join(" ")))?;
        } else {
            writer.write_text(&format!("{} {} {}", cmd.old, cmd.new, cmd.name))?;
        }
    }
    writer.write_flush()?;
    Ok(())
}

/// Server side: parse update commands up to the flush, returning the
/// commands and the capability list carried on the first line.
pub fn read_commands<R: std::io::Read>(reader: &mut PktLineReader<R>) -> Result<(Vec<RefUpdateCommand>, Capabilities), ProtocolError> {
    let mut commands = Vec::new();
    let mut capabilities = Capabilities::default();
    let mut first_line = true;

    for data in reader.read_until_flush()? {
        let mut line = strip_newline(&data);

        if first_line {
            first_line = false;
            if let Some(nul_pos) = line.iter().position(|&b| b == 0) {
                capabilities = Capabilities::parse(&String::from_utf8_lossy(&line[nul_pos + 1..]));
                line = &line[..nul_pos];
            }
        }

        let mut parts = line.splitn(3, |&b| b == b' ');
        let old = parts.next().ok_or_else(|| ProtocolError::Protocol("missing old OID in update command".into()))?;
        let new = parts.next().ok_or_else(|| ProtocolError::Protocol("missing new OID in update command".into()))?;
        let name = parts.next().ok_or_else(|| ProtocolError::Protocol("missing ref name in update command".into()))?;

        let old = Oid::from_hex(std::str::from_utf8(old).map_err(|_| ProtocolError::Protocol("invalid UTF-8 in old OID".into()))?)?;
        let new = Oid::from_hex(std::str::from_utf8(new).map_err(|_| ProtocolError::Protocol("invalid UTF-8 in new OID".into()))?)?;

        commands.push(RefUpdateCommand { old, new, name: BString::from(name) });
    }

    Ok((commands, capabilities))
}

/// Result of applying the pack and each ref update, as reported by
/// `report-status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportStatus {
    /// `Ok(())` for `unpack ok`, `Err(reason)` for `unpack <reason>`.
    pub unpack: Result<(), String>,
    /// Per-ref `ok <ref>` / `ng <ref> <reason>` results, in command order.
    pub commands: Vec<(BString, Result<(), String>)>,
}

impl ReportStatus {
    pub fn is_ok(&self) -> bool {
        self.unpack.is_ok() && self.commands.iter().all(|(_, r)| r.is_ok())
    }
}

/// Server side: write the `report-status` sequence.
pub fn write_report_status<W: std::io::Write>(writer: &mut PktLineWriter<W>, status: &ReportStatus) -> Result<(), ProtocolError> {
    match &status.unpack {
        Ok(()) => writer.write_text("unpack ok")?,
        Err(reason) => writer.write_text(&format!("unpack {reason}"))?,
    }
    for (name, result) in &status.commands {
        match result {
            Ok(()) => writer.write_text(&format!("ok {name}"))?,
            Err(reason) => writer.write_text(&format!("ng {name} {reason}"))?,
        }
    }
    writer.write_flush()?;
    Ok(())
}

/// Client side: read the `report-status` sequence.
pub fn read_report_status<R: std::io::Read>(reader: &mut PktLineReader<R>) -> Result<ReportStatus, ProtocolError> {
    let lines = reader.read_until_flush()?;
    let mut lines = lines.into_iter();

    let first = lines.next().ok_or_else(|| ProtocolError::Protocol("empty report-status".into()))?;
    let first = String::from_utf8_lossy(strip_newline(&first)).into_owned();
    let unpack = match first.strip_prefix("unpack ") {
        Some("ok") => Ok(()),
        Some(reason) => Err(reason.to_string()),
        None => return Err(ProtocolError::Protocol(format!("expected 'unpack' line, got: {first}"))),
    };

    let mut commands = Vec::new();
    for data in lines {
        let line = String::from_utf8_lossy(strip_newline(&data)).into_owned();
        if let Some(name) = line.strip_prefix("ok ") {
            commands.push((BString::from(name), Ok(())));
        } else if let Some(rest) = line.strip_prefix("ng ") {
            let (name, reason) = rest.split_once(' ').unwrap_or((rest, "unknown error"));
            commands.push((BString::from(name), Err(reason.to_string())));
        } else {
            return Err(ProtocolError::Protocol(format!("malformed report-status line: {line}")));
        }
    }

    Ok(ReportStatus { unpack, commands })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn oid(hex: &str) -> Oid {
        Oid::from_hex(hex).unwrap()
    }

    #[test]
    fn ref_advertisement_roundtrip() {
        let o = oid("95d09f2b10159347eece71399a7e2e907ea3df4f");
        let mut buf = Vec::new();
        {
            let mut writer = PktLineWriter::new(&mut buf);
            write_ref_advertisement(&mut writer, &[(o, "HEAD"), (o, "refs/heads/main")], &["report-status".into(), "ofs-delta".into()]).unwrap();
        }

        let mut reader = PktLineReader::new(Cursor::new(buf));
        let (refs, caps) = parse_ref_advertisement(&mut reader).unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].1.as_slice(), b"HEAD");
        assert!(caps.has("report-status"));
        assert!(caps.has("ofs-delta"));
    }

    #[test]
    fn empty_repo_advertises_capabilities_placeholder() {
        let mut buf = Vec::new();
        {
            let mut writer = PktLineWriter::new(&mut buf);
            write_ref_advertisement(&mut writer, &[], &["report-status".into()]).unwrap();
        }

        let mut reader = PktLineReader::new(Cursor::new(buf));
        let (refs, caps) = parse_ref_advertisement(&mut reader).unwrap();
        assert!(refs.is_empty());
        assert!(caps.has("report-status"));
    }

    #[test]
    fn upload_pack_negotiation_no_common_objects() {
        let want = oid("95d09f2b10159347eece71399a7e2e907ea3df4f");

        let mut client_buf = Vec::new();
        {
            let mut writer = PktLineWriter::new(&mut client_buf);
            send_wants_haves_done(&mut writer, &[want], &[], &["ofs-delta".into()]).unwrap();
        }

        let mut server_reader = PktLineReader::new(Cursor::new(client_buf));
        let (wants, caps) = read_wants(&mut server_reader).unwrap();
        assert_eq!(wants, vec![want]);
        assert!(caps.has("ofs-delta"));

        let (haves, done) = read_haves(&mut server_reader).unwrap();
        assert!(haves.is_empty());
        assert!(done);

        let mut server_resp = Vec::new();
        {
            let mut writer = PktLineWriter::new(&mut server_resp);
            write_nak(&mut writer).unwrap();
        }
        let mut client_reader = PktLineReader::new(Cursor::new(server_resp));
        assert_eq!(read_negotiation_result(&mut client_reader).unwrap(), NegotiationResult::Nak);
    }

    #[test]
    fn upload_pack_negotiation_with_common_object() {
        let have = oid("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
        let mut server_resp = Vec::new();
        {
            let mut writer = PktLineWriter::new(&mut server_resp);
            write_ack_ready(&mut writer, have).unwrap();
        }
        let mut reader = PktLineReader::new(Cursor::new(server_resp));
        assert_eq!(read_negotiation_result(&mut reader).unwrap(), NegotiationResult::AckReady(have));
    }

    #[test]
    fn receive_pack_command_roundtrip() {
        let old = Oid::NULL;
        let new = oid("95d09f2b10159347eece71399a7e2e907ea3df4f");
        let cmd = RefUpdateCommand { old, new, name: BString::from("refs/heads/topic") };
        assert!(cmd.is_create());

        let mut buf = Vec::new();
        {
            let mut writer = PktLineWriter::new(&mut buf);
            write_commands(&mut writer, &[cmd.clone()], &["report-status".into()]).unwrap();
        }

        let mut reader = PktLineReader::new(Cursor::new(buf));
        let (commands, caps) = read_commands(&mut reader).unwrap();
        assert_eq!(commands, vec![cmd]);
        assert!(caps.has("report-status"));
    }

    #[test]
    fn report_status_all_ok_roundtrip() {
        let status = ReportStatus {
            unpack: Ok(()),
            commands: vec![(BString::from("refs/heads/main"), Ok(()))],
        };

        let mut buf = Vec::new();
        {
            let mut writer = PktLineWriter::new(&mut buf);
            write_report_status(&mut writer, &status).unwrap();
        }

        let mut reader = PktLineReader::new(Cursor::new(buf));
        let parsed = read_report_status(&mut reader).unwrap();
        assert!(parsed.is_ok());
        assert_eq!(parsed, status);
    }

    #[test]
    fn report_status_reports_rejection() {
        let status = ReportStatus {
            unpack: Ok(()),
            commands: vec![(BString::from("refs/heads/main"), Err("non-fast-forward".to_string()))],
        };

        let mut buf = Vec::new();
        {
            let mut writer = PktLineWriter::new(&mut buf);
            write_report_status(&mut writer, &status).unwrap();
        }

        let mut reader = PktLineReader::new(Cursor::new(buf));
        let parsed = read_report_status(&mut reader).unwrap();
        assert!(!parsed.is_ok());
        assert_eq!(parsed.commands[0].1, Err("non-fast-forward".to_string()));
    }

    #[test]
    fn report_status_reports_unpack_failure() {
        let status = ReportStatus { unpack: Err("index-pack failed".to_string()), commands: vec![] };

        let mut buf = Vec::new();
        {
            let mut writer = PktLineWriter::new(&mut buf);
            write_report_status(&mut writer, &status).unwrap();
        }

        let mut reader = PktLineReader::new(Cursor::new(buf));
        let parsed = read_report_status(&mut reader).unwrap();
        assert!(!parsed.is_ok());
        assert_eq!(parsed.unpack, Err("index-pack failed".to_string()));
    }
}
