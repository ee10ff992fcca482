//! Reverse-chronological walk of the daily program trees
//!
//! Folders are laid out as year / month / day and, for reprograms, one
//! more level of revision letters. Each level is listed newest first and
//! the walk halts at the first day older than the threshold, so only the
//! requested window is ever fetched.

use std::vec::IntoIter;

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use serde::Serialize;

use super::listing::{
    day_of, keyed_descending, month_of, parse_file_inputs, parse_folder_links, version_of,
    year_of, FolderLink, ListingRoot, ListingSource, PROGRAM_ROOT, REPROGRAM_ROOT,
};

/// A file found in the browser tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadEntry {
    pub date: NaiveDate,
    pub version: Option<String>,
    pub file_name: String,
    pub url: String,
}

/// Innermost folder level holding the files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Day,
    Version,
}

/// A fully resolved innermost folder with its listing
#[derive(Debug, Clone)]
pub struct Leaf {
    pub date: NaiveDate,
    pub version: Option<String>,
    pub html: String,
}

enum Frame {
    Years(IntoIter<(i32, String)>),
    Months {
        year: i32,
        entries: IntoIter<(u32, String)>,
    },
    Days {
        year: i32,
        month: u32,
        entries: IntoIter<(u32, String)>,
    },
    Versions {
        date: NaiveDate,
        entries: IntoIter<(String, String)>,
    },
}

enum Step {
    Pop,
    Year(i32, String),
    Month(i32, u32, String),
    Day(i32, u32, u32, String),
    Version(NaiveDate, String, String),
}

/// Depth-first traversal over an explicit stack of folder frames.
///
/// Leaves are produced lazily by [`Traversal::next_leaf`]; each call
/// issues only the requests needed to reach the next leaf.
pub struct Traversal<'s, S> {
    source: &'s S,
    root: ListingRoot,
    depth: Depth,
    threshold: NaiveDate,
    stack: Vec<Frame>,
    started: bool,
    halted: bool,
    calls: usize,
}

impl<'s, S: ListingSource> Traversal<'s, S> {
    pub fn new(source: &'s S, root: ListingRoot, depth: Depth, threshold: NaiveDate) -> Self {
        Self {
            source,
            root,
            depth,
            threshold,
            stack: Vec::new(),
            started: false,
            halted: false,
            calls: 0,
        }
    }

    /// Listing requests issued so far
    pub fn calls(&self) -> usize {
        self.calls
    }

    /// Whether the walk stopped on a day older than the threshold
    pub fn halted(&self) -> bool {
        self.halted
    }

    async fn list(&mut self, path: &str) -> Result<Vec<FolderLink>> {
        let html = self.list_raw(path).await?;
        parse_folder_links(&html)
    }

    async fn list_raw(&mut self, path: &str) -> Result<String> {
        self.calls += 1;
        self.source.list(&self.root, path).await
    }

    pub async fn next_leaf(&mut self) -> Result<Option<Leaf>> {
        if self.halted {
            return Ok(None);
        }

        if !self.started {
            self.started = true;
            let years = self.list(self.root.base_directory).await?;
            let years = keyed_descending(years, year_of)?;
            self.stack.push(Frame::Years(years.into_iter()));
        }

        loop {
            let step = match self.stack.last_mut() {
                None => return Ok(None),
                Some(Frame::Years(entries)) => match entries.next() {
                    Some((year, id)) => Step::Year(year, id),
                    None => Step::Pop,
                },
                Some(Frame::Months { year, entries }) => match entries.next() {
                    Some((month, id)) => Step::Month(*year, month, id),
                    None => Step::Pop,
                },
                Some(Frame::Days { year, month, entries }) => match entries.next() {
                    Some((day, id)) => Step::Day(*year, *month, day, id),
                    None => Step::Pop,
                },
                Some(Frame::Versions { date, entries }) => match entries.next() {
                    Some((version, id)) => Step::Version(*date, version, id),
                    None => Step::Pop,
                },
            };

            match step {
                Step::Pop => {
                    self.stack.pop();
                }
                Step::Year(year, id) => {
                    let months = keyed_descending(self.list(&id).await?, month_of)?;
                    self.stack.push(Frame::Months {
                        year,
                        entries: months.into_iter(),
                    });
                }
                Step::Month(year, month, id) => {
                    let days = keyed_descending(self.list(&id).await?, day_of)?;
                    self.stack.push(Frame::Days {
                        year,
                        month,
                        entries: days.into_iter(),
                    });
                }
                Step::Day(year, month, day, id) => {
                    let html = self.list_raw(&id).await?;
                    let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
                        anyhow!("Folder {} is not a calendar date ({}-{}-{})", id, year, month, day)
                    })?;

                    if date < self.threshold {
                        tracing::debug!("Reached {} before threshold {}, stopping", date, self.threshold);
                        self.halted = true;
                        self.stack.clear();
                        return Ok(None);
                    }

                    match self.depth {
                        Depth::Day => {
                            tracing::info!("Listing files of {}", date);
                            return Ok(Some(Leaf {
                                date,
                                version: None,
                                html,
                            }));
                        }
                        Depth::Version => {
                            let versions = keyed_descending(parse_folder_links(&html)?, |id| {
                                Ok(version_of(id))
                            })?;
                            self.stack.push(Frame::Versions {
                                date,
                                entries: versions.into_iter(),
                            });
                        }
                    }
                }
                Step::Version(date, version, id) => {
                    let html = self.list_raw(&id).await?;
                    tracing::info!("Listing files of {} - {}", date, version);
                    return Ok(Some(Leaf {
                        date,
                        version: Some(version),
                        html,
                    }));
                }
            }
        }
    }

    /// Drain the traversal into download entries, newest first
    pub async fn collect_entries(&mut self) -> Result<Vec<DownloadEntry>> {
        let mut entries = Vec::new();
        while let Some(leaf) = self.next_leaf().await? {
            for file in parse_file_inputs(&leaf.html)? {
                entries.push(DownloadEntry {
                    date: leaf.date,
                    version: leaf.version.clone(),
                    file_name: file.file_name,
                    url: file.url,
                });
            }
        }
        Ok(entries)
    }
}

/// Files of "Programa Diario de Operación" dated on or after `threshold`
pub async fn list_daily_program_files<S: ListingSource>(
    source: &S,
    threshold: NaiveDate,
) -> Result<Vec<DownloadEntry>> {
    Traversal::new(source, PROGRAM_ROOT, Depth::Day, threshold)
        .collect_entries()
        .await
}

/// Files of "Reprograma Diario de Operación" dated on or after `threshold`,
/// tagged with their revision letter
pub async fn list_daily_reprogram_files<S: ListingSource>(
    source: &S,
    threshold: NaiveDate,
) -> Result<Vec<DownloadEntry>> {
    Traversal::new(source, REPROGRAM_ROOT, Depth::Version, threshold)
        .collect_entries()
        .await
}
