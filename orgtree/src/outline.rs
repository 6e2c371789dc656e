//! Section tree built incrementally while headlines are parsed.
//!
//! Sections live in an arena addressed by [`SectionId`]; index 0 is the root sentinel
//! without a headline. Children are owned top-down through `children`, `parent` is only
//! a lookup edge used when inserting.

use crate::core::Inline;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SectionId(usize);

/// What the outline keeps of a headline: enough for a table of contents.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SectionHeadline {
    pub index: usize,
    pub level: usize,
    pub number: String,
    pub status: Option<String>,
    pub title: Vec<Inline>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub headline: Option<SectionHeadline>,
    pub parent: Option<SectionId>,
    pub children: Vec<SectionId>,
}

impl Section {
    /// Root level is 0, lower than any real headline.
    pub fn level(&self) -> usize {
        self.headline.as_ref().map_or(0, |h| h.level)
    }

    pub fn number(&self) -> Option<&str> {
        self.headline.as_ref().map(|h| h.number.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outline {
    sections: Vec<Section>,
    /// Most recently inserted section.
    last: SectionId,
    count: usize,
    sec_count: usize,
}

impl Default for Outline {
    fn default() -> Self {
        Self::new()
    }
}

impl Outline {
    pub const ROOT: SectionId = SectionId(0);

    pub fn new() -> Self {
        Self {
            sections: vec![Section {
                headline: None,
                parent: None,
                children: vec![],
            }],
            last: Self::ROOT,
            count: 0,
            sec_count: 1,
        }
    }

    /// Number of headlines inserted so far.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn root(&self) -> &Section {
        &self.sections[Self::ROOT.0]
    }

    pub fn section(&self, id: SectionId) -> Option<&Section> {
        self.sections.get(id.0)
    }

    pub fn parent(&self, id: SectionId) -> Option<&Section> {
        self.section(id)?.parent.and_then(|p| self.section(p))
    }

    pub fn children(&self, id: SectionId) -> impl Iterator<Item = (SectionId, &Section)> + '_ {
        self.section(id)
            .map(|s| s.children.as_slice())
            .unwrap_or_default()
            .iter()
            .map(|&c| (c, &self.sections[c.0]))
    }

    /// All real sections in document order (depth-first, pre-order).
    pub fn walk(&self) -> impl Iterator<Item = (SectionId, &Section)> + '_ {
        self.sections
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, s)| (SectionId(i), s))
    }

    /// Insert a headline of `level`, returning its section, document index and number.
    ///
    /// A headline shallower than the previous one takes its previous sibling's last
    /// number segment plus one, so numbers stay unique after jumping up several levels.
    pub fn add_headline(&mut self, level: usize) -> (SectionId, usize, String) {
        let current = SectionId(self.sections.len());
        self.sections.push(Section {
            headline: Some(SectionHeadline {
                level,
                ..SectionHeadline::default()
            }),
            parent: None,
            children: vec![],
        });
        self.add(self.last, current);
        self.count += 1;

        let last_level = self.sections[self.last.0].headline.as_ref().map(|h| h.level);
        match last_level {
            None => {}
            Some(l) if l == level => self.sec_count += 1,
            Some(l) if l < level => self.sec_count = 1,
            Some(_) => {
                // continue numbering after the sibling this section follows
                self.sec_count = self
                    .previous_sibling(current)
                    .and_then(|s| s.number())
                    .and_then(|n| n.rsplit('.').next())
                    .and_then(|n| n.parse::<usize>().ok())
                    .map_or(1, |n| n + 1);
            }
        }

        let number = match self.parent(current).and_then(Section::number) {
            Some(parent) => format!("{}.{}", parent, self.sec_count),
            None => self.sec_count.to_string(),
        };
        if let Some(h) = self.sections[current.0].headline.as_mut() {
            h.index = self.count;
            h.number = number.clone();
        }
        self.last = current;
        (current, self.count, number)
    }

    /// Fill in the title fields once the headline text has been parsed.
    pub fn describe(
        &mut self,
        id: SectionId,
        status: Option<String>,
        title: Vec<Inline>,
        tags: Vec<String>,
    ) {
        if let Some(h) = self.sections.get_mut(id.0).and_then(|s| s.headline.as_mut()) {
            h.status = status;
            h.title = title;
            h.tags = tags;
        }
    }

    /// Attach `current` below `parent`, or walk up until a strictly lower level is found.
    fn add(&mut self, parent: SectionId, current: SectionId) {
        let level = self.sections[current.0].level();
        let section = &self.sections[parent.0];
        if section.headline.is_none() || section.level() < level {
            self.sections[parent.0].children.push(current);
            self.sections[current.0].parent = Some(parent);
        } else {
            let grandparent = section.parent.unwrap_or(Self::ROOT);
            self.add(grandparent, current);
        }
    }

    fn previous_sibling(&self, id: SectionId) -> Option<&Section> {
        let siblings = &self.section(self.section(id)?.parent?)?.children;
        let pos = siblings.iter().position(|&c| c == id)?;
        pos.checked_sub(1).map(|p| &self.sections[siblings[p].0])
    }
}
