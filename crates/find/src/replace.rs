use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use documents::{Buffer, Region, region_offsets};
use regex::Regex;

use crate::{
    FindError,
    link::FindLink,
    request::FindRequest,
    results::{FindResults, ResultsView},
};

/// Replaces matches of a finished find, keeping track of where the
/// remaining matches moved to as earlier ones are edited.
#[derive(Debug)]
pub struct Replacer {
    request: FindRequest,
    re: Regex,
    /// Per file: original region and where it is now, `None` once replaced or
    /// invalidated by an overlapping edit
    regions: HashMap<PathBuf, Vec<(Region, Option<Region>)>>,
}

impl Replacer {
    pub fn new(results: &FindResults) -> Result<Self, FindError> {
        let regions = results
            .files
            .iter()
            .map(|f| {
                let tracked = f.regions.iter().map(|r| (*r, Some(*r))).collect();
                (f.path.clone(), tracked)
            })
            .collect();
        Ok(Self {
            re: results.request.compile()?,
            request: results.request.clone(),
            regions,
        })
    }

    /// Current regions of the matches still pending in `path`
    pub fn highlights(&self, path: &Path) -> Vec<Region> {
        self.regions
            .get(path)
            .map(|tracked| tracked.iter().filter_map(|(_, now)| *now).collect())
            .unwrap_or_default()
    }

    /// Where the match behind `link` currently is
    pub fn current_region(&self, link: &FindLink) -> Option<Region> {
        self.regions
            .get(&link.path)?
            .iter()
            .find(|(original, _)| *original == link.region)
            .and_then(|(_, now)| *now)
    }

    /// Highlight the pending matches of the linked file in `buffer`,
    /// returning where the linked match is now
    pub fn show(&self, link: &FindLink, buffer: &dyn Buffer) -> Option<Region> {
        buffer.set_highlights(self.highlights(&link.path));
        self.current_region(link)
    }

    fn replacement_for(&self, matched: &str) -> String {
        if self.request.regex {
            self.re
                .replace(matched, self.request.replace.as_str())
                .into_owned()
        } else {
            self.request.replace.clone()
        }
    }

    /// Replace the match behind `link` in `buffer`.
    ///
    /// Returns false, leaving the buffer alone, if the match was already
    /// replaced or no longer matches.
    #[tracing::instrument(skip_all, fields(link = %link))]
    pub fn replace(&mut self, link: &FindLink, buffer: &dyn Buffer) -> Result<bool, FindError> {
        let Some(region) = self.current_region(link) else {
            tracing::debug!("match is stale");
            return Ok(false);
        };

        let text = buffer.text();
        let Some((start, end)) = region_offsets(&text, region) else {
            tracing::debug!(%region, "region no longer in buffer");
            return Ok(false);
        };
        let matched = &text[start..end];
        if !self
            .re
            .find(matched)
            .is_some_and(|m| m.start() == 0 && m.end() == matched.len())
        {
            tracing::debug!(%matched, "text no longer matches");
            return Ok(false);
        }

        let replacement = self.replacement_for(matched);
        let match_case = self.request.ignore_case && !self.request.regex;
        let edit = buffer.replace_text(region, &replacement, match_case)?;

        if let Some(tracked) = self.regions.get_mut(&link.path) {
            for (original, now) in tracked.iter_mut() {
                *now = if *original == link.region {
                    None
                } else {
                    now.and_then(|r| r.adjusted(&edit))
                };
            }
        }
        Ok(true)
    }

    /// Replace the match linked from results line `line` and drop that line,
    /// so the following match moves up under the cursor.
    pub fn replace_at(
        &mut self,
        view: &mut ResultsView,
        line: usize,
        buffer: &dyn Buffer,
    ) -> Result<bool, FindError> {
        let link = view
            .link_at(line)
            .ok_or_else(|| FindError::BadLink(view.lines().get(line).cloned().unwrap_or_default()))?;
        let replaced = self.replace(&link, buffer)?;
        view.remove_line(line);
        buffer.set_highlights(self.highlights(&link.path));
        Ok(replaced)
    }

    /// Replace every pending match, opening buffers with `open`.
    ///
    /// Returns the number of replacements made.
    pub fn replace_all(
        &mut self,
        results: &FindResults,
        open: &mut dyn FnMut(&Path) -> Result<Arc<dyn Buffer>, FindError>,
    ) -> Result<usize, FindError> {
        let mut replaced = 0;
        for file in &results.files {
            let buffer = match &file.buffer {
                Some(buffer) => Arc::clone(buffer),
                None => open(&file.path)?,
            };
            for region in &file.regions {
                let link = FindLink {
                    path: file.path.clone(),
                    results_line: 0,
                    count: file.count,
                    region: *region,
                };
                if self.replace(&link, buffer.as_ref())? {
                    replaced += 1;
                }
            }
            buffer.set_highlights(Vec::new());
        }
        tracing::debug!(replaced, "replaced all matches");
        Ok(replaced)
    }
}
