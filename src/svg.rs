// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! In-place updates of the card template.
//!
//! The template is treated as text. An element is located by its `id`
//! attribute and only the span between its opening tag and the matching
//! closing tag is replaced, so formatting, comments and every other element
//! survive byte for byte.

use std::{
    collections::BTreeMap,
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    config::FieldOverride,
    error::{self, Error},
    stats::StatsRecord,
};

/// Logical value slot on the card.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum StatField
{
    Age,
    Repos,
    Contributed,
    Stars,
    Commits,
    Followers,
    LocTotal,
    LocAdded,
    LocDeleted,
}

impl StatField
{
    pub const ALL: [StatField; 9] = [
        StatField::Age,
        StatField::Repos,
        StatField::Contributed,
        StatField::Stars,
        StatField::Commits,
        StatField::Followers,
        StatField::LocTotal,
        StatField::LocAdded,
        StatField::LocDeleted,
    ];

    /// Element id used by the stock template.
    pub fn default_id(self,) -> &'static str
    {
        match self {
            StatField::Age => "age_data",
            StatField::Repos => "repo_data",
            StatField::Contributed => "contrib_data",
            StatField::Stars => "star_data",
            StatField::Commits => "commit_data",
            StatField::Followers => "follower_data",
            StatField::LocTotal => "loc_data",
            StatField::LocAdded => "loc_add",
            StatField::LocDeleted => "loc_del",
        }
    }

    /// Dot column width used by the stock template, if the slot is justified.
    pub fn default_dots_width(self,) -> Option<usize,>
    {
        match self {
            StatField::Age => Some(49,),
            StatField::Commits => Some(22,),
            StatField::Stars => Some(14,),
            StatField::Repos => Some(6,),
            StatField::Followers => Some(10,),
            StatField::LocTotal => Some(9,),
            StatField::LocDeleted => Some(7,),
            StatField::Contributed | StatField::LocAdded => None,
        }
    }

    /// Text written for this field.
    pub fn render(self, stats: &StatsRecord,) -> String
    {
        let value = match self {
            StatField::Age => return stats.age_text.clone(),
            StatField::Repos => stats.repo_count,
            StatField::Contributed => stats.contributed_count,
            StatField::Stars => stats.star_total,
            StatField::Commits => stats.commit_count,
            StatField::Followers => stats.follower_count,
            StatField::LocTotal => stats.lines_of_code.total,
            StatField::LocAdded => stats.lines_of_code.added,
            StatField::LocDeleted => stats.lines_of_code.deleted,
        };
        format_thousands(value,)
    }
}

/// Where a field is written in the template.
#[derive(Debug, Clone, PartialEq, Eq,)]
pub struct FieldSlot
{
    pub field:      StatField,
    pub id:         String,
    /// Column width for the paired `{id}_dots` element.
    pub dots_width: Option<usize,>,
}

impl FieldSlot
{
    pub fn dots_id(&self,) -> String
    {
        format!("{}_dots", self.id)
    }
}

/// Mapping of every [`StatField`] onto template elements.
#[derive(Debug, Clone, PartialEq, Eq,)]
pub struct CardLayout
{
    slots: Vec<FieldSlot,>,
}

impl Default for CardLayout
{
    fn default() -> Self
    {
        Self {
            slots: StatField::ALL
                .into_iter()
                .map(|field| FieldSlot {
                    field,
                    id: field.default_id().to_owned(),
                    dots_width: field.default_dots_width(),
                },)
                .collect(),
        }
    }
}

impl CardLayout
{
    /// Applies per-field overrides; a dots width of `0` disables justification.
    pub fn with_overrides(mut self, overrides: &BTreeMap<StatField, FieldOverride,>,) -> Self
    {
        for slot in &mut self.slots {
            let Some(custom,) = overrides.get(&slot.field,) else {
                continue;
            };
            if let Some(id,) = custom.id.as_ref().filter(|id| !id.trim().is_empty(),) {
                slot.id = id.trim().to_owned();
            }
            if let Some(width,) = custom.dots_width {
                slot.dots_width = (width > 0).then_some(width,);
            }
        }
        self
    }

    pub fn slot(&self, field: StatField,) -> Option<&FieldSlot,>
    {
        self.slots.iter().find(|slot| slot.field == field,)
    }

    pub fn slots(&self,) -> &[FieldSlot]
    {
        &self.slots
    }
}

/// Outcome of writing a [`StatsRecord`] into a template.
#[derive(Debug, Clone, Default, PartialEq, Eq,)]
pub struct UpdateReport
{
    pub updated: Vec<StatField,>,
    /// Element ids that were not present in the template.
    pub missing: Vec<String,>,
}

/// SVG template held as text.
#[derive(Debug, Clone, PartialEq, Eq,)]
pub struct SvgDocument
{
    text: String,
}

impl SvgDocument
{
    /// Reads a template from disk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the file does not exist and
    /// [`Error::Io`] when it cannot be read.
    pub fn load(path: &Path,) -> Result<Self, Error,>
    {
        if !path.exists() {
            return Err(Error::not_found(format!("SVG template {}", path.display()),),);
        }
        let text = fs::read_to_string(path,).map_err(|source| error::io_error(path, source,),)?;
        Ok(Self::parse(text,),)
    }

    pub fn parse(text: impl Into<String,>,) -> Self
    {
        Self {
            text: text.into(),
        }
    }

    pub fn as_str(&self,) -> &str
    {
        &self.text
    }

    pub fn into_string(self,) -> String
    {
        self.text
    }

    /// Whether an element with the given id exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when no pattern can be built for `id`.
    pub fn contains_id(&self, id: &str,) -> Result<bool, Error,>
    {
        Ok(opening_tag(id,)?.is_match(&self.text,),)
    }

    /// Replaces the text content of the element with the given id.
    ///
    /// Returns `false` when no such element exists or it is never closed.
    /// Self-closing elements are expanded into an open/close pair.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when no pattern can be built for `id`.
    pub fn set_text(&mut self, id: &str, value: &str,) -> Result<bool, Error,>
    {
        let pattern = opening_tag(id,)?;
        let Some(captures,) = pattern.captures(&self.text,) else {
            return Ok(false,);
        };
        let (Some(whole,), Some(name,),) = (captures.get(0,), captures.get(1,),) else {
            return Ok(false,);
        };
        let tag = whole.range();
        let name = name.as_str().to_owned();
        let open = whole.as_str().trim_end_matches('>',).trim_end_matches('/',).trim_end().to_owned();
        let self_closing = captures.get(2,).is_some_and(|slash| !slash.as_str().is_empty(),);
        let escaped = escape_text(value,);

        if self_closing {
            self.text.replace_range(tag, &format!("{open}>{escaped}</{name}>"),);
            return Ok(true,);
        }

        let content_start = tag.end;
        let Some(content_end,) = closing_tag_offset(&self.text, &name, content_start,)? else {
            warn!("Element '{}' has no closing tag, leaving it untouched", id);
            return Ok(false,);
        };

        self.text.replace_range(content_start..content_end, &escaped,);
        Ok(true,)
    }
}

fn opening_tag(id: &str,) -> Result<Regex, Error,>
{
    let pattern = format!(
        r#"<([A-Za-z_][\w:.-]*)(?:\s[^>]*?)?\sid\s*=\s*["']{}["'][^>]*?(/?)>"#,
        regex::escape(id,)
    );
    Regex::new(&pattern,).map_err(|e| Error::config(format!("invalid element id '{id}': {e}"),),)
}

/// Byte offset of the closing tag that balances an element opened just before
/// `from`, counting nested elements of the same name.
fn closing_tag_offset(text: &str, name: &str, from: usize,) -> Result<Option<usize,>, Error,>
{
    let pattern = format!(r"<(/?){}(?:\s[^>]*?)?(/?)>", regex::escape(name,));
    let tags = Regex::new(&pattern,)
        .map_err(|e| Error::config(format!("invalid element name '{name}': {e}"),),)?;

    let mut depth = 1usize;
    for captures in tags.captures_iter(&text[from..],) {
        let closing = captures.get(1,).is_some_and(|m| !m.as_str().is_empty(),);
        let self_closing = captures.get(2,).is_some_and(|m| !m.as_str().is_empty(),);
        let Some(whole,) = captures.get(0,) else {
            continue;
        };

        if closing {
            depth -= 1;
            if depth == 0 {
                return Ok(Some(from + whole.start(),),);
            }
        } else if !self_closing {
            depth += 1;
        }
    }

    Ok(None,)
}

fn escape_text(value: &str,) -> String
{
    let mut escaped = String::with_capacity(value.len(),);
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;",),
            '<' => escaped.push_str("&lt;",),
            '>' => escaped.push_str("&gt;",),
            other => escaped.push(other,),
        }
    }
    escaped
}

/// Formats an integer with `,` thousands separators.
pub fn format_thousands(value: u64,) -> String
{
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3,);
    for (index, ch,) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            out.push(',',);
        }
        out.push(ch,);
    }
    out
}

/// Separator run that pads `value` to `width` columns.
pub fn dot_fill(value: &str, width: usize,) -> String
{
    match width.saturating_sub(value.chars().count(),) {
        0 => String::new(),
        1 => " ".to_owned(),
        2 => ". ".to_owned(),
        n => format!(" {} ", ".".repeat(n,)),
    }
}

/// Writes every slot of `layout` into `doc`.
///
/// Missing value elements are reported and logged as warnings; missing dots
/// elements are optional.
///
/// # Errors
///
/// Returns [`Error::Config`] when a configured id cannot be matched at all.
pub fn apply_stats(
    doc: &mut SvgDocument,
    stats: &StatsRecord,
    layout: &CardLayout,
) -> Result<UpdateReport, Error,>
{
    let mut report = UpdateReport::default();

    for slot in layout.slots() {
        let value = slot.field.render(stats,);
        if doc.set_text(&slot.id, &value,)? {
            report.updated.push(slot.field,);
        } else {
            warn!("Element '{}' not found in template, skipping", slot.id);
            report.missing.push(slot.id.clone(),);
            continue;
        }

        if let Some(width,) = slot.dots_width {
            let dots_id = slot.dots_id();
            if !doc.set_text(&dots_id, &dot_fill(&value, width,),)? {
                debug!("No '{}' element in template", dots_id);
            }
        }
    }

    Ok(report,)
}

/// Sibling path holding the pre-update template.
pub fn backup_path(path: &Path,) -> PathBuf
{
    let mut raw = OsString::from(path.as_os_str(),);
    raw.push(".bak",);
    PathBuf::from(raw,)
}

/// Loads the template at `path`, optionally backs it up, applies `stats` and
/// writes the result back.
///
/// # Errors
///
/// Returns [`Error::NotFound`] for a missing template and [`Error::Io`] when
/// the backup or the template cannot be written.
pub fn update_card(
    path: &Path,
    stats: &StatsRecord,
    layout: &CardLayout,
    backup: bool,
) -> Result<UpdateReport, Error,>
{
    let mut doc = SvgDocument::load(path,)?;

    if backup {
        let backup = backup_path(path,);
        fs::write(&backup, doc.as_str(),).map_err(|source| error::io_error(&backup, source,),)?;
        debug!("Backed up template to {}", backup.display());
    }

    let report = apply_stats(&mut doc, stats, layout,)?;
    fs::write(path, doc.as_str(),).map_err(|source| error::io_error(path, source,),)?;

    info!(
        "Updated {} of {} fields in {}",
        report.updated.len(),
        layout.slots().len(),
        path.display()
    );
    Ok(report,)
}
