//! Read and write Mobipocket (MOBI6/KF8) e-book containers.
//!
//! The top-level entry point is [`Mobi`], which hides the PalmDB container,
//! the MOBI6/KF8 header pair, EXTH metadata, and the FDST/INDX/SKEL/FRAG
//! machinery behind a flat metadata API and two data units ([`MobiData`])
//! plus an embedded-resource list ([`MobiResource`]).

mod date;
mod error;
mod exth;
mod fdst;
mod font;
mod index;
mod mobi_data;
mod mobi_header;
mod io;
mod palmdb;
mod parts;
mod resource;
mod varint;

use std::fs::File;
use std::io::Read;
use std::path::Path;

pub use error::{MobiError, Result};
pub use exth::{Exth, ExthRecord};
pub use mobi_data::MobiData;
pub use resource::MobiResource;

use palmdb::{PalmDb, PalmDbRecord};

/// A Mobipocket e-book: a MOBI6 unit, an optional KF8 unit layered on top of
/// it (the "hybrid" format real-world readers still ship), and the resource
/// block shared between them.
///
/// Metadata getters/setters read and write whichever unit is "active" — KF8
/// when present, MOBI6 otherwise — matching how reading apps resolve the
/// same hybrid file.
#[derive(Debug, Clone, Default)]
pub struct Mobi {
    mobi6: Option<MobiData>,
    kf8: Option<MobiData>,
    resources: Vec<MobiResource>,
    title: String,
    author: String,
    publisher: String,
    description: String,
    subjects: Vec<String>,
    publishing_date: Option<i64>,
    copyright: String,
}

fn active_unit<'a>(mobi6: &'a Option<MobiData>, kf8: &'a Option<MobiData>) -> Option<&'a MobiData> {
    kf8.as_ref().or(mobi6.as_ref())
}

fn set_or_remove(exth: &mut Exth, tag: u32, value: &str) {
    if value.is_empty() {
        exth.remove(tag);
    } else {
        exth.set_single(tag, ExthRecord::string(tag, value));
    }
}

impl Mobi {
    /// Parses a complete MOBI file already loaded into memory.
    pub fn new(content: &[u8]) -> Result<Mobi> {
        Mobi::from_bytes(content)
    }

    /// Reads and parses a MOBI file from disk.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Mobi> {
        let mut file = File::open(path)?;
        let mut content = Vec::new();
        file.read_to_end(&mut content)?;
        Mobi::from_bytes(&content)
    }

    /// Reads and parses a MOBI file from any [`std::io::Read`] source.
    pub fn from_read<R: Read>(mut r: R) -> Result<Mobi> {
        let mut content = Vec::new();
        r.read_to_end(&mut content)?;
        Mobi::from_bytes(&content)
    }

    fn from_bytes(content: &[u8]) -> Result<Mobi> {
        let palmdb = PalmDb::read(content)?;
        let records: Vec<&[u8]> = palmdb.records.iter().map(|r| r.content.as_slice()).collect();
        if records.is_empty() {
            return Err(MobiError::MalformedContainer("palmdb has no records".into()));
        }

        let first = MobiData::read(&records)?;

        let (mobi6, kf8) = if first.version >= 8 {
            log::debug!("detected KF8-only layout");
            (None, Some(first))
        } else {
            let boundary = first.exth.get(exth::TAG_KF8_BOUNDARY).and_then(|r| r.as_u32());
            match boundary {
                Some(idx) => {
                    log::debug!("detected hybrid layout, KF8 boundary at record {}", idx);
                    let kf8_records = records.get(idx as usize..).ok_or_else(|| {
                        MobiError::MalformedContainer("KF8 boundary index points past end of records".into())
                    })?;
                    let kf8 = MobiData::read(kf8_records)?;
                    (Some(first), Some(kf8))
                }
                None => {
                    log::debug!("detected MOBI6-only layout");
                    (Some(first), None)
                }
            }
        };

        let resource_base = match (&mobi6, &kf8) {
            (Some(unit), _) => unit.image_index,
            (None, Some(unit)) => unit.image_index,
            (None, None) => None,
        };
        let resources = match resource_base {
            Some(idx) => {
                let resource_records = records.get(idx as usize..).ok_or_else(|| {
                    MobiError::MalformedContainer("image_index points past end of records".into())
                })?;
                resource::read_all(resource_records)?
            }
            None => Vec::new(),
        };

        let active = active_unit(&mobi6, &kf8).expect("read always produces at least one unit");
        let title = active.full_name.clone();
        let author = active.exth.get(exth::TAG_AUTHOR).map(|r| r.as_str()).unwrap_or_default();
        let publisher = active.exth.get(exth::TAG_PUBLISHER).map(|r| r.as_str()).unwrap_or_default();
        let description = active.exth.get(exth::TAG_DESCRIPTION).map(|r| r.as_str()).unwrap_or_default();
        let copyright = active.exth.get(exth::TAG_RIGHTS).map(|r| r.as_str()).unwrap_or_default();
        let subjects = active.exth.get_all(exth::TAG_SUBJECT).iter().map(|r| r.as_str()).collect();
        let publishing_date = active
            .exth
            .get(exth::TAG_PUBLISH_DATE)
            .map(|r| date::parse_publish_date(&r.as_str()));

        log::info!(
            "parsed mobi: title={:?} mobi6={} kf8={} resources={}",
            title,
            mobi6.is_some(),
            kf8.is_some(),
            resources.len()
        );

        Ok(Mobi {
            mobi6,
            kf8,
            resources,
            title,
            author,
            publisher,
            description,
            subjects,
            publishing_date,
            copyright,
        })
    }

    /// Serializes this book back into a complete MOBI file.
    pub fn write(&self) -> Result<Vec<u8>> {
        let mut mobi6 = self.mobi6.clone();
        let mut kf8 = self.kf8.clone();
        if mobi6.is_none() && kf8.is_none() {
            mobi6 = Some(MobiData::default());
        }

        {
            let active = kf8.as_mut().or(mobi6.as_mut()).expect("at least one unit present");
            active.full_name = self.title.clone();
            set_or_remove(&mut active.exth, exth::TAG_AUTHOR, &self.author);
            set_or_remove(&mut active.exth, exth::TAG_PUBLISHER, &self.publisher);
            set_or_remove(&mut active.exth, exth::TAG_DESCRIPTION, &self.description);
            set_or_remove(&mut active.exth, exth::TAG_RIGHTS, &self.copyright);
            active.exth.set_repeated(exth::TAG_SUBJECT, self.subjects.iter().cloned());
            match self.publishing_date {
                Some(ts) => active.exth.set_single(
                    exth::TAG_PUBLISH_DATE,
                    ExthRecord::string(exth::TAG_PUBLISH_DATE, &date::format_publish_date(ts)),
                ),
                None => active.exth.remove(exth::TAG_PUBLISH_DATE),
            }
        }

        if let Some(kf8_unit) = kf8.as_mut() {
            kf8_unit.exth.remove(exth::TAG_KF8_BOUNDARY);
        }

        let resource_records = if self.resources.is_empty() {
            Vec::new()
        } else {
            resource::write_all(&self.resources)?
        };

        let mut records: Vec<Vec<u8>> = Vec::new();
        match (mobi6.as_mut(), kf8.as_mut()) {
            (Some(m6), Some(k8)) => {
                m6.image_index = None;
                let provisional = m6.write()?;
                let m6_len = provisional.len();
                if !self.resources.is_empty() {
                    m6.image_index = Some(m6_len as u32);
                }
                let boundary = m6_len as u32 + resource_records.len() as u32;
                m6.exth
                    .set_single(exth::TAG_KF8_BOUNDARY, ExthRecord::u32(exth::TAG_KF8_BOUNDARY, boundary));

                let m6_records = m6.write()?;
                if m6_records.len() != m6_len {
                    return Err(MobiError::MalformedContainer(format!(
                        "writing the KF8 boundary EXTH tag changed the MOBI6 record count from {} to {}; the computed boundary offset is no longer valid",
                        m6_len,
                        m6_records.len()
                    )));
                }

                k8.image_index = None;
                let k8_records = k8.write()?;

                records.extend(m6_records);
                records.extend(resource_records);
                records.extend(k8_records);
                records.push(resource::EOF_MAGIC.to_vec());
            }
            (Some(unit), None) | (None, Some(unit)) => {
                unit.image_index = None;
                let provisional = unit.write()?;
                if !self.resources.is_empty() {
                    unit.image_index = Some(provisional.len() as u32);
                    records.extend(unit.write()?);
                } else {
                    records.extend(provisional);
                }
                records.extend(resource_records);
            }
            (None, None) => unreachable!("ensured at least one unit above"),
        }

        let palmdb = PalmDb {
            name: self.title.clone(),
            records: records
                .into_iter()
                .enumerate()
                .map(|(i, content)| PalmDbRecord {
                    attributes: 0,
                    uid: i as u32,
                    content,
                })
                .collect(),
            ..PalmDb::default()
        };
        Ok(palmdb.write())
    }

    /// Serializes and writes this book to disk.
    pub fn write_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = self.write()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn set_author(&mut self, author: impl Into<String>) {
        self.author = author.into();
    }

    pub fn publisher(&self) -> &str {
        &self.publisher
    }

    pub fn set_publisher(&mut self, publisher: impl Into<String>) {
        self.publisher = publisher.into();
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn subjects(&self) -> &[String] {
        &self.subjects
    }

    pub fn set_subjects(&mut self, subjects: Vec<String>) {
        self.subjects = subjects;
    }

    pub fn publishing_date(&self) -> Option<i64> {
        self.publishing_date
    }

    pub fn set_publishing_date(&mut self, timestamp: Option<i64>) {
        self.publishing_date = timestamp;
    }

    #[cfg(feature = "time")]
    pub fn publishing_datetime(&self) -> Option<chrono::NaiveDateTime> {
        self.publishing_date.map(date::to_naive_datetime)
    }

    pub fn copyright(&self) -> &str {
        &self.copyright
    }

    pub fn set_copyright(&mut self, copyright: impl Into<String>) {
        self.copyright = copyright.into();
    }

    pub fn mobi6(&self) -> Option<&MobiData> {
        self.mobi6.as_ref()
    }

    pub fn set_mobi6(&mut self, unit: Option<MobiData>) {
        self.mobi6 = unit;
    }

    pub fn kf8(&self) -> Option<&MobiData> {
        self.kf8.as_ref()
    }

    pub fn set_kf8(&mut self, unit: Option<MobiData>) {
        self.kf8 = unit;
    }

    pub fn resources(&self) -> &[MobiResource] {
        &self.resources
    }

    pub fn set_resources(&mut self, resources: Vec<MobiResource>) {
        self.resources = resources;
    }

    /// `true` if this book carries a KF8 unit (with or without a MOBI6
    /// fallback alongside it).
    pub fn is_kf8(&self) -> bool {
        self.kf8.is_some()
    }
}
