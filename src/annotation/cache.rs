use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::annotation::genes::GeneSet;

const MAGIC: &[u8; 4] = b"SCG1";
const CACHE_VERSION: u32 = 1;

/// Side-car cache path for an annotation source: `.{filename}.cache` in the
/// same directory.
pub fn cache_path(source: &Path) -> Option<PathBuf> {
    let name = source.file_name()?.to_str()?;
    Some(source.with_file_name(format!(".{name}.cache")))
}

/// Load a cached gene collection.
///
/// Returns `None` on any failure (missing file, wrong magic, version
/// mismatch, corrupt payload); the caller re-parses the source instead.
pub fn load(path: &Path) -> Option<GeneSet> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 4];
    if reader.read_exact(&mut magic).is_err() || &magic != MAGIC {
        debug!("cache {}: bad magic, reparsing", path.display());
        return None;
    }

    let mut version = [0u8; 4];
    if reader.read_exact(&mut version).is_err() {
        return None;
    }
    if u32::from_le_bytes(version) != CACHE_VERSION {
        debug!("cache {}: version mismatch, reparsing", path.display());
        return None;
    }

    match bincode::deserialize_from(reader) {
        Ok(set) => Some(set),
        Err(e) => {
            debug!("cache {}: {}, reparsing", path.display(), e);
            None
        }
    }
}

/// Write the cache after a fresh parse. Best-effort: failures are logged
/// and otherwise ignored.
pub fn store(path: &Path, set: &GeneSet) {
    if let Err(e) = try_store(path, set) {
        warn!("could not write annotation cache {}: {}", path.display(), e);
    }
}

fn try_store(path: &Path, set: &GeneSet) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(MAGIC)?;
    writer.write_all(&CACHE_VERSION.to_le_bytes())?;
    bincode::serialize_into(&mut writer, set)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_set() -> GeneSet {
        let gtf = "\
chr1\tsrc\texon\t101\t110\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";
chr1\tsrc\texon\t151\t160\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";
chr2\tsrc\texon\t1001\t1100\t.\t-\t.\tgene_id \"G2\"; transcript_id \"T2\";
";
        GeneSet::from_reader(Cursor::new(gtf.as_bytes())).unwrap()
    }

    #[test]
    fn cache_path_is_hidden_sidecar() {
        let p = cache_path(Path::new("/data/genes.gtf")).unwrap();
        assert_eq!(p, PathBuf::from("/data/.genes.gtf.cache"));
    }

    #[test]
    fn round_trip_reproduces_the_collection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".genes.gtf.cache");

        let set = sample_set();
        store(&path, &set);

        let loaded = load(&path).expect("cache should load");
        assert_eq!(loaded.len(), set.len());
        for (a, b) in loaded.genes().zip(set.genes()) {
            assert_eq!(a.gid, b.gid);
            assert_eq!(a.chrom, b.chrom);
            assert_eq!(a.strand, b.strand);
            assert_eq!(a.start, b.start);
            assert_eq!(a.end, b.end);
            assert_eq!(a.transcripts().len(), b.transcripts().len());
        }
    }

    #[test]
    fn missing_file_loads_as_none() {
        assert!(load(Path::new("/definitely/not/here.cache")).is_none());
    }

    #[test]
    fn bad_magic_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.cache");
        std::fs::write(&path, b"NOPE").unwrap();
        assert!(load(&path).is_none());
    }

    #[test]
    fn version_mismatch_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.cache");

        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&(CACHE_VERSION + 1).to_le_bytes());
        bytes.extend_from_slice(&bincode::serialize(&sample_set()).unwrap());
        std::fs::write(&path, bytes).unwrap();

        assert!(load(&path).is_none());
    }

    #[test]
    fn truncated_payload_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.cache");

        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&CACHE_VERSION.to_le_bytes());
        bytes.extend_from_slice(&[1, 2, 3]);
        std::fs::write(&path, bytes).unwrap();

        assert!(load(&path).is_none());
    }
}
