//! `compact`: stream all loose objects into a single pack.

use git_hash::ObjectId;
use git_loose::LooseObjectStore;
use git_odb::ObjectDatabase;
use git_pack::write::create_pack;

use crate::GcError;

/// Stream every loose object into a new `pack-<checksum>.pack` + `.idx`
/// pair, refresh the object database's pack list, then delete the loose
/// files whose ids landed in the pack. Returns the number of objects
/// packed. A no-op (returns 0) if there are no loose objects.
pub fn compact(odb: &ObjectDatabase) -> Result<usize, GcError> {
    let loose = LooseObjectStore::open(odb.objects_dir(), odb.hash_algo());

    let oids: Vec<ObjectId> = loose.iter()?.collect::<Result<_, _>>()?;
    if oids.is_empty() {
        return Ok(0);
    }

    let mut objects = Vec::with_capacity(oids.len());
    for oid in &oids {
        let Some(obj) = loose.read(oid)? else {
            continue;
        };
        objects.push((obj.object_type(), obj.serialize_content()));
    }

    let pack_dir = odb.objects_dir().join("pack");
    std::fs::create_dir_all(&pack_dir)?;

    let tmp_name = format!("tmp-compact-{}", std::process::id());
    let (tmp_pack, tmp_idx, checksum) = create_pack(&pack_dir, &tmp_name, &objects)?;

    let final_pack = pack_dir.join(format!("pack-{checksum}.pack"));
    let final_idx = pack_dir.join(format!("pack-{checksum}.idx"));
    std::fs::rename(&tmp_pack, &final_pack)?;
    std::fs::rename(&tmp_idx, &final_idx)?;

    odb.refresh()?;

    for oid in &oids {
        loose.delete(oid)?;
    }

    Ok(oids.len())
}
