use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

use anyhow::Context;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// All parts of an OPC package, in archive order.
#[derive(Default)]
pub struct XlsxPackage {
    pub entries: Vec<XlsxEntry>,
}

pub struct XlsxEntry {
    pub name: String,
    pub data: Vec<u8>,
}

impl XlsxPackage {
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let f = File::open(path).with_context(|| format!("open xlsx: {}", path.display()))?;
        Self::from_reader(f)
    }

    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        Self::from_reader(Cursor::new(bytes))
    }

    fn from_reader<R: Read + Seek>(reader: R) -> anyhow::Result<Self> {
        let mut zip = ZipArchive::new(reader).context("read zip")?;
        let mut entries = Vec::new();
        for i in 0..zip.len() {
            let mut file = zip.by_index(i).context("zip entry")?;
            if file.is_dir() {
                continue;
            }
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data).context("read zip entry")?;
            entries.push(XlsxEntry {
                name: file.name().to_string(),
                data,
            });
        }
        Ok(Self { entries })
    }

    pub fn push(&mut self, name: impl Into<String>, data: Vec<u8>) {
        self.entries.push(XlsxEntry {
            name: name.into(),
            data,
        });
    }

    #[must_use]
    pub fn entry(&self, name: &str) -> Option<&[u8]> {
        let name = name.trim_start_matches('/');
        self.entries
            .iter()
            .find(|e| e.name == name || e.name.eq_ignore_ascii_case(name))
            .map(|e| e.data.as_slice())
    }

    pub fn write(&self, output_path: &Path) -> anyhow::Result<()> {
        let f = File::create(output_path)
            .with_context(|| format!("create output xlsx: {}", output_path.display()))?;
        let mut zout = ZipWriter::new(f);
        for ent in &self.entries {
            let opts =
                SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            zout.start_file(ent.name.as_str(), opts)
                .with_context(|| format!("start zip file: {}", ent.name))?;
            zout.write_all(&ent.data)
                .with_context(|| format!("write zip file: {}", ent.name))?;
        }
        zout.finish().context("finish zip")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn written_package_reads_back() {
        let path = std::env::temp_dir().join(format!("fc-pkg-{}.zip", std::process::id()));
        let mut pkg = XlsxPackage::default();
        pkg.push("xl/workbook.xml", b"<workbook/>".to_vec());
        pkg.push("[Content_Types].xml", b"<Types/>".to_vec());
        pkg.write(&path).expect("write");

        let back = XlsxPackage::read(&path).expect("read");
        assert_eq!(back.entries.len(), 2);
        assert_eq!(back.entry("/xl/workbook.xml"), Some(&b"<workbook/>"[..]));
        assert!(back.entry("xl/missing.xml").is_none());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn garbage_is_not_a_package() {
        assert!(XlsxPackage::from_bytes(b"not a zip").is_err());
    }
}
