//! Fetch protocol implementation.
//!
//! Orchestrates the core of a fetch operation over an already-open
//! bidirectional byte stream: negotiate wants/haves, receive the pack, and
//! hand back the ref updates the caller should apply. Connection setup is
//! the caller's concern — these functions only read and write.

use std::io::Read as IoRead;
use std::path::{Path, PathBuf};

use git_hash::ObjectId;
use git_object::ObjectType;

use crate::capability::{self, Capabilities, SidebandMode};
use crate::pktline::{PktLineReader, PktLineWriter};
use crate::sideband::SidebandReader;
use crate::ProtocolError;

/// Fetch operation options.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Show progress output.
    pub progress: bool,
}

/// Result of a fetch operation.
#[derive(Debug)]
pub struct FetchResult {
    /// Path to the received pack file (if any).
    pub pack_path: Option<PathBuf>,
    /// Ref updates to apply.
    pub ref_updates: Vec<(String, ObjectId)>,
    /// Number of new objects received.
    pub new_objects: usize,
}

/// Perform a fetch operation's wants/haves negotiation and pack transfer
/// over an already-connected `reader`/`writer` pair.
///
/// `resolve_local` is consulted to fix up thin packs: it should return the
/// type and content of any object the caller already has locally, by OID.
#[allow(clippy::too_many_arguments)]
pub fn fetch<W: std::io::Write, R: IoRead>(
    writer: &mut W,
    reader: &mut R,
    advertised_refs: &[(ObjectId, bstr::BString)],
    server_caps: &Capabilities,
    local_refs: &[(ObjectId, String)],
    wanted_refs: &[String],
    pack_dir: Option<&Path>,
    resolve_local: &dyn Fn(&ObjectId) -> Option<(ObjectType, Vec<u8>)>,
) -> Result<FetchResult, ProtocolError> {
    let wants: Vec<ObjectId> = determine_wants(advertised_refs, wanted_refs);

    if wants.is_empty() {
        return Ok(FetchResult {
            pack_path: None,
            ref_updates: Vec::new(),
            new_objects: 0,
        });
    }

    let haves: Vec<ObjectId> = local_refs.iter().map(|(oid, _)| *oid).collect();
    let client_caps = capability::negotiate_fetch_capabilities(server_caps);
    let sideband_mode = capability::select_sideband(server_caps);

    {
        let mut pkt_writer = PktLineWriter::new(&mut *writer);

        for (i, want) in wants.iter().enumerate() {
            if i == 0 && !client_caps.is_empty() {
                let caps_str = client_caps.join(" ");
                pkt_writer.write_text(&format!("want {} {}", want, caps_str))?;
            } else {
                pkt_writer.write_text(&format!("want {}", want))?;
            }
        }
        pkt_writer.write_flush()?;

        for have in &haves {
            pkt_writer.write_text(&format!("have {}", have))?;
        }
        pkt_writer.write_text("done")?;
        pkt_writer.flush()?;
    }

    {
        let mut pkt_reader = PktLineReader::new(&mut *reader);
        loop {
            match pkt_reader.read_pkt()? {
                crate::pktline::PktLine::Data(data) => {
                    let line = String::from_utf8_lossy(&data);
                    let line = line.trim_end_matches('\n');
                    if line == "NAK" {
                        break;
                    }
                    if line.starts_with("ACK ") {
                        continue;
                    }
                    break;
                }
                crate::pktline::PktLine::Flush => break,
                _ => break,
            }
        }
    }

    let pack_data = receive_pack_data(reader, sideband_mode)?;

    let mut result = FetchResult {
        pack_path: None,
        ref_updates: Vec::new(),
        new_objects: 0,
    };

    if !pack_data.is_empty() {
        result.new_objects = count_pack_objects(&pack_data);

        if let Some(dir) = pack_dir {
            let (pack_path, _idx_path, _checksum) =
                git_pack::write::index_received_pack(dir, &pack_data, resolve_local)?;
            result.pack_path = Some(pack_path);
        }
    }

    for (oid, refname) in advertised_refs {
        let name = String::from_utf8_lossy(refname.as_ref()).to_string();
        if wanted_refs.is_empty() || wanted_refs.iter().any(|w| name.contains(w)) {
            result.ref_updates.push((name, *oid));
        }
    }

    Ok(result)
}

/// Determine which OIDs to request from the server.
fn determine_wants(
    advertised_refs: &[(ObjectId, bstr::BString)],
    wanted_refs: &[String],
) -> Vec<ObjectId> {
    let mut wants = Vec::new();

    for (oid, refname) in advertised_refs {
        let name = String::from_utf8_lossy(refname.as_ref()).to_string();

        if wanted_refs.is_empty() {
            if !wants.contains(oid) {
                wants.push(*oid);
            }
        } else {
            for wanted in wanted_refs {
                if (name.contains(wanted) || name == *wanted) && !wants.contains(oid) {
                    wants.push(*oid);
                }
            }
        }
    }

    wants
}

/// Receive pack data from the reader, handling sideband demuxing if needed.
fn receive_pack_data<R: IoRead>(
    reader: &mut R,
    sideband_mode: SidebandMode,
) -> Result<Vec<u8>, ProtocolError> {
    match sideband_mode {
        SidebandMode::None => {
            let mut data = Vec::new();
            reader.read_to_end(&mut data)?;
            Ok(data)
        }
        SidebandMode::Band | SidebandMode::Band64k => {
            let pkt_reader = PktLineReader::new(reader);
            let mut sideband = SidebandReader::new(pkt_reader);
            sideband.read_all_data()
        }
    }
}

/// Count objects in a pack (quick check from header).
fn count_pack_objects(pack_data: &[u8]) -> usize {
    if pack_data.len() < 12 {
        return 0;
    }
    if &pack_data[0..4] != b"PACK" {
        return 0;
    }
    u32::from_be_bytes([pack_data[8], pack_data[9], pack_data[10], pack_data[11]]) as usize
}
