use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::time::Duration;

use bzip2::read::MultiBzDecoder;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{PunktError, Result};

pub fn dump_url(language: &str) -> String {
    format!(
        "https://dumps.wikimedia.org/{language}wiki/latest/{language}wiki-latest-pages-articles.xml.bz2"
    )
}

/// Downloads the latest pages-articles dump for `language` to `path`.
///
/// The download goes to a `.part` file first, so an interrupted download
/// never leaves a truncated dump behind.
pub fn download_dump(language: &str, path: &Path, show_progress: bool) -> Result<()> {
    let url = dump_url(language);
    info!("Downloading Wikipedia dump from {url}");

    let client = reqwest::blocking::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .timeout(None)
        .user_agent(concat!("punkt/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let response = client.get(&url).send()?.error_for_status()?;

    let progress = match (show_progress, response.content_length()) {
        (false, _) => ProgressBar::hidden(),
        (true, Some(total)) => ProgressBar::new(total),
        (true, None) => ProgressBar::new_spinner(),
    };
    progress.set_style(
        ProgressStyle::with_template("{spinner} {bytes}/{total_bytes} {bytes_per_sec} eta {eta}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let partial = path.with_extension("part");
    let file = File::create(&partial).map_err(|e| PunktError::io(e, Some(partial.clone())))?;
    let mut writer = BufWriter::new(file);
    std::io::copy(&mut progress.wrap_read(response), &mut writer)
        .map_err(|e| PunktError::io(e, Some(partial.clone())))?;
    writer.flush()?;
    drop(writer);
    progress.finish_and_clear();

    std::fs::rename(&partial, path).map_err(|e| PunktError::io(e, Some(path.to_path_buf())))?;
    info!("Download complete: {}", path.display());
    Ok(())
}

#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct Page {
    pub title: String,
    pub text: String,
    pub redirect: bool,
}

#[derive(Debug, Copy, Clone)]
enum Field {
    Title,
    Text,
}

/// Streams `<page>` elements out of a MediaWiki XML export.
///
/// Elements are matched by local name, so the export schema version does not matter.
pub struct PageReader<R: BufRead> {
    reader: Reader<R>,
    buffer: Vec<u8>,
    page: Option<Page>,
    field: Option<Field>,
    namespace: Option<String>,
}

pub type DumpReader = PageReader<BufReader<Box<dyn Read + Send>>>;

impl DumpReader {
    /// Opens a dump file, decompressing it when it ends in `.bz2`.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| PunktError::io(e, Some(path.to_path_buf())))?;
        let inner: Box<dyn Read + Send> = if path.extension().map_or(false, |e| e == "bz2") {
            // dumps are multistream archives
            Box::new(MultiBzDecoder::new(file))
        } else {
            Box::new(file)
        };
        Ok(PageReader::new(BufReader::with_capacity(1 << 20, inner)))
    }
}

impl<R: BufRead> PageReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Reader::from_reader(reader),
            buffer: Vec::new(),
            page: None,
            field: None,
            namespace: None,
        }
    }

    /// The XML namespace of the export root element, once it has been seen.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    fn next_page(&mut self) -> Result<Option<Page>> {
        loop {
            self.buffer.clear();
            match self.reader.read_event_into(&mut self.buffer)? {
                Event::Start(start) => match start.local_name().as_ref() {
                    b"mediawiki" => {
                        if let Ok(Some(xmlns)) = start.try_get_attribute("xmlns") {
                            let namespace = xmlns.unescape_value()?.into_owned();
                            info!("Detected namespace {namespace}");
                            self.namespace = Some(namespace);
                        }
                    }
                    b"page" => self.page = Some(Page::default()),
                    b"title" if self.page.is_some() => self.field = Some(Field::Title),
                    b"text" if self.page.is_some() => self.field = Some(Field::Text),
                    b"redirect" => {
                        if let Some(page) = &mut self.page {
                            page.redirect = true;
                        }
                    }
                    _ => {}
                },
                Event::Empty(empty) => {
                    if empty.local_name().as_ref() == b"redirect" {
                        if let Some(page) = &mut self.page {
                            page.redirect = true;
                        }
                    }
                }
                Event::Text(text) => {
                    if let (Some(field), Some(page)) = (self.field, &mut self.page) {
                        let text = text.unescape()?;
                        match field {
                            Field::Title => page.title.push_str(&text),
                            Field::Text => page.text.push_str(&text),
                        }
                    }
                }
                Event::CData(data) => {
                    if let (Some(Field::Text), Some(page)) = (self.field, &mut self.page) {
                        page.text.push_str(&String::from_utf8_lossy(&data));
                    }
                }
                Event::End(end) => match end.local_name().as_ref() {
                    b"title" | b"text" => self.field = None,
                    b"page" => {
                        if let Some(page) = self.page.take() {
                            debug!("Read page {:?}", page.title);
                            return Ok(Some(page));
                        }
                    }
                    _ => {}
                },
                Event::Eof => return Ok(None),
                _ => {}
            }
        }
    }
}

impl<R: BufRead> Iterator for PageReader<R> {
    type Item = Result<Page>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_page().transpose()
    }
}
