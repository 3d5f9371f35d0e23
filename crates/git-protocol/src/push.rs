//! Push protocol (send-pack) implementation.
//!
//! Implements the client side of the send-pack ↔ receive-pack protocol:
//! 1. Read server's ref advertisement
//! 2. Send ref update commands
//! 3. Generate and stream thin pack
//! 4. Parse server's status report

use std::io::{Read as IoRead, Write};

use bstr::BString;
use git_hash::ObjectId;
use git_odb::ObjectDatabase;

use crate::capability::{self, Capabilities, SidebandMode};
use crate::pktline::{PktLineReader, PktLineWriter};
use crate::ProtocolError;

/// A single ref update to push.
#[derive(Debug, Clone)]
pub struct PushUpdate {
    /// Local OID to push. None = delete the remote ref.
    pub local_oid: Option<ObjectId>,
    /// Remote ref name to update.
    pub remote_ref: String,
    /// Force push (skip fast-forward check).
    pub force: bool,
    /// Expected remote OID for --force-with-lease (None = no check).
    pub expected_remote_oid: Option<ObjectId>,
}

/// Push operation options.
#[derive(Debug, Clone)]
pub struct PushOptions {
    /// Show progress.
    pub progress: bool,
    /// Atomic push (all or nothing).
    pub atomic: bool,
    /// Push option strings (--push-option).
    pub push_options: Vec<String>,
}

impl Default for PushOptions {
    fn default() -> Self {
        Self {
            progress: true,
            atomic: false,
            push_options: Vec::new(),
        }
    }
}

/// Result of a push operation.
#[derive(Debug)]
pub struct PushResult {
    /// Overall success.
    pub ok: bool,
    /// Per-ref results.
    pub ref_results: Vec<(String, PushRefResult)>,
    /// Server message (if any).
    pub server_message: Option<String>,
}

/// Result for a single ref update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushRefResult {
    /// Ref updated successfully.
    Ok,
    /// Push rejected (non-fast-forward, force-with-lease mismatch, etc.).
    Rejected(String),
    /// Server-side error.
    Error(String),
}

/// Perform the send-pack push protocol over an already-connected
/// `reader`/`writer` pair.
///
/// Protocol flow:
/// 1. Check force-with-lease constraints against advertised refs
/// 2. Send ref update commands: `<old-oid> <new-oid> <refname>\n`
/// 3. Send flush
/// 4. Optionally send push-option lines + flush
/// 5. Send pack data (objects reachable from new OIDs but not from the
///    remote's advertised OIDs — see [`compute_push_objects`])
/// 6. Read and parse status report
#[allow(clippy::too_many_arguments)]
pub fn push<W: Write, R: IoRead>(
    writer: &mut W,
    reader: &mut R,
    advertised_refs: &[(ObjectId, BString)],
    server_caps: &Capabilities,
    updates: &[PushUpdate],
    pack_data: &[u8],
    options: &PushOptions,
) -> Result<PushResult, ProtocolError> {
    if updates.is_empty() {
        return Ok(PushResult {
            ok: true,
            ref_results: Vec::new(),
            server_message: Some("Everything up-to-date".into()),
        });
    }

    for update in updates {
        if let Some(expected) = &update.expected_remote_oid {
            let actual = find_advertised_oid(advertised_refs, &update.remote_ref);
            let actual_oid = actual.unwrap_or(ObjectId::NULL_SHA1);
            if actual_oid != *expected {
                return Ok(PushResult {
                    ok: false,
                    ref_results: vec![(
                        update.remote_ref.clone(),
                        PushRefResult::Rejected(format!(
                            "stale info: expected {} but got {}",
                            expected, actual_oid
                        )),
                    )],
                    server_message: None,
                });
            }
        }
    }

    let client_caps = capability::negotiate_push_capabilities(server_caps);
    let has_report_status = server_caps.has("report-status");
    let has_push_options = server_caps.has("push-options") && !options.push_options.is_empty();
    let has_atomic = server_caps.has("atomic") && options.atomic;
    let sideband_mode = capability::select_sideband(server_caps);

    let mut cap_list = client_caps.clone();
    if has_atomic {
        cap_list.push("atomic".into());
    }
    if has_push_options {
        cap_list.push("push-options".into());
    }

    {
        let mut pkt_writer = PktLineWriter::new(&mut *writer);

        for (i, update) in updates.iter().enumerate() {
            let old_oid = find_advertised_oid(advertised_refs, &update.remote_ref)
                .unwrap_or(ObjectId::NULL_SHA1);

            let new_oid = update.local_oid.unwrap_or(ObjectId::NULL_SHA1);

            let line = if i == 0 {
                format!(
                    "{} {} {}\0{}",
                    old_oid,
                    new_oid,
                    update.remote_ref,
                    cap_list.join(" ")
                )
            } else {
                format!("{} {} {}", old_oid, new_oid, update.remote_ref)
            };

            pkt_writer.write_text(&line)?;
        }

        pkt_writer.write_flush()?;

        if has_push_options {
            for opt in &options.push_options {
                pkt_writer.write_text(opt)?;
            }
            pkt_writer.write_flush()?;
        }

        if !pack_data.is_empty() {
            pkt_writer.inner_mut().write_all(pack_data)?;
        }

        pkt_writer.flush()?;
    }

    if has_report_status {
        parse_push_status(reader, sideband_mode)
    } else {
        Ok(PushResult {
            ok: true,
            ref_results: updates
                .iter()
                .map(|u| (u.remote_ref.clone(), PushRefResult::Ok))
                .collect(),
            server_message: None,
        })
    }
}

/// Parse the server's push status report.
fn parse_push_status<R: IoRead>(
    reader: &mut R,
    sideband_mode: SidebandMode,
) -> Result<PushResult, ProtocolError> {
    let status_lines = if sideband_mode != SidebandMode::None {
        let pkt_reader = PktLineReader::new(&mut *reader);
        let mut sideband = crate::sideband::SidebandReader::new(pkt_reader);
        let data = sideband.read_all_data()?;
        let mut inner_reader = PktLineReader::new(std::io::Cursor::new(data));
        inner_reader.read_until_flush()?
    } else {
        let mut pkt_reader = PktLineReader::new(reader);
        pkt_reader.read_until_flush()?
    };

    let mut ok = true;
    let mut ref_results = Vec::new();
    let mut server_message = None;

    for line_data in &status_lines {
        let line = String::from_utf8_lossy(line_data);
        let line = line.trim_end_matches('\n');

        if let Some(status) = line.strip_prefix("unpack ") {
            if status != "ok" {
                ok = false;
                server_message = Some(format!("unpack failed: {}", status));
            }
        } else if let Some(rest) = line.strip_prefix("ok ") {
            ref_results.push((rest.to_string(), PushRefResult::Ok));
        } else if let Some(rest) = line.strip_prefix("ng ") {
            ok = false;
            let parts: Vec<&str> = rest.splitn(2, ' ').collect();
            if parts.len() == 2 {
                ref_results.push((
                    parts[0].to_string(),
                    PushRefResult::Rejected(parts[1].to_string()),
                ));
            } else {
                ref_results.push((
                    rest.to_string(),
                    PushRefResult::Rejected("unknown error".to_string()),
                ));
            }
        }
    }

    Ok(PushResult {
        ok,
        ref_results,
        server_message,
    })
}

/// Find the advertised OID for a ref name.
fn find_advertised_oid(
    advertised_refs: &[(ObjectId, BString)],
    refname: &str,
) -> Option<ObjectId> {
    for (oid, name) in advertised_refs {
        if <BString as AsRef<[u8]>>::as_ref(name) == refname.as_bytes() {
            return Some(*oid);
        }
    }
    None
}

/// Compute which objects need to be sent for a push: everything reachable
/// from `local_oids` (the new ref tips) that is not already reachable from
/// `remote_oids` (what the server advertised). Delegates to the same
/// reachability walk pack generation uses.
pub fn compute_push_objects(
    odb: &ObjectDatabase,
    local_oids: &[ObjectId],
    remote_oids: &[ObjectId],
) -> Result<Vec<ObjectId>, ProtocolError> {
    Ok(git_revwalk::collect_reachable(odb, local_oids, remote_oids)
        .map_err(|e| ProtocolError::Protocol(e.to_string()))?)
}
