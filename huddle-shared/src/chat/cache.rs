//! Client-side view of a chat's message history.
//!
//! The cache holds the pages fetched so far, newest page first and each page
//! newest item first. Live events are merged in place; every mutation keeps
//! message ids unique across all pages.

use uuid::Uuid;

use crate::models::{ChatKey, MessageEvent, MessagePage, MessageView};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatCache {
    key: ChatKey,
    pages: Vec<MessagePage>,
}

impl ChatCache {
    #[must_use]
    pub const fn new(key: ChatKey) -> Self {
        Self {
            key,
            pages: Vec::new(),
        }
    }

    #[must_use]
    pub const fn key(&self) -> &ChatKey {
        &self.key
    }

    #[must_use]
    pub fn pages(&self) -> &[MessagePage] {
        &self.pages
    }

    /// True until the first page has been stored or synthesized.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Total number of cached messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.iter().map(|page| page.items.len()).sum()
    }

    #[must_use]
    pub fn contains(&self, id: Uuid) -> bool {
        self.find(id).is_some()
    }

    /// Cursor to request the next (older) page with; `None` once history is
    /// exhausted or before the first page arrived.
    #[must_use]
    pub fn next_cursor(&self) -> Option<Uuid> {
        self.pages.last().and_then(|page| page.next_cursor)
    }

    #[must_use]
    pub fn has_next_page(&self) -> bool {
        self.next_cursor().is_some()
    }

    /// Item count of the newest page; drives auto-scroll decisions.
    #[must_use]
    pub fn newest_page_len(&self) -> usize {
        self.pages.first().map_or(0, |page| page.items.len())
    }

    /// All cached messages, newest first.
    pub fn messages(&self) -> impl DoubleEndedIterator<Item = &MessageView> {
        self.pages.iter().flat_map(|page| page.items.iter())
    }

    /// Drops everything and starts over from a freshly fetched first page.
    pub fn replace_with_first_page(&mut self, page: MessagePage) {
        self.pages = vec![page];
    }

    /// Appends an older page. Items already cached (for example delivered by
    /// push while the fetch was in flight) are skipped.
    pub fn append_page(&mut self, mut page: MessagePage) {
        page.items.retain(|item| !self.contains(item.id));
        self.pages.push(page);
    }

    /// Merges a re-fetched newest page: known items are replaced in place,
    /// unknown ones are inserted into the newest page in order. Older pages
    /// and their cursors are left untouched.
    ///
    /// A full page whose oldest item is not cached leaves a hole between it
    /// and the cached pages. The cache then restarts from that page and its
    /// cursor, and `true` is returned.
    pub fn refresh_first_page(&mut self, page: MessagePage) -> bool {
        if self.pages.is_empty() {
            self.pages.push(page);
            return false;
        }

        let overlaps = page.next_cursor.is_none()
            || page.items.last().is_some_and(|oldest| self.contains(oldest.id));
        if !overlaps {
            self.replace_with_first_page(page);
            return true;
        }

        for item in page.items {
            if let Some((page_idx, item_idx)) = self.find(item.id) {
                self.pages[page_idx].items[item_idx] = item;
            } else {
                let newest = &mut self.pages[0].items;
                let position = newest
                    .iter()
                    .position(|existing| existing.sort_key() < item.sort_key())
                    .unwrap_or(newest.len());
                newest.insert(position, item);
            }
        }
        false
    }

    /// Adds a newly created message at the head of the newest page. Returns
    /// `false` if the message was already cached.
    pub fn apply_create(&mut self, message: MessageView) -> bool {
        if self.contains(message.id) {
            return false;
        }

        match self.pages.first_mut() {
            Some(newest) => newest.items.insert(0, message),
            None => self.pages.push(MessagePage {
                items: vec![message],
                next_cursor: None,
            }),
        }
        true
    }

    /// Replaces the cached copy of an edited or soft-deleted message. Returns
    /// `false` when the message is not cached; such updates are dropped.
    pub fn apply_update(&mut self, message: MessageView) -> bool {
        match self.find(message.id) {
            Some((page_idx, item_idx)) => {
                self.pages[page_idx].items[item_idx] = message;
                true
            }
            None => false,
        }
    }

    pub fn apply_event(&mut self, event: MessageEvent) -> bool {
        match event {
            MessageEvent::Created(message) => self.apply_create(message),
            MessageEvent::Edited(message) | MessageEvent::SoftDeleted(message) => {
                self.apply_update(message)
            }
        }
    }

    fn find(&self, id: Uuid) -> Option<(usize, usize)> {
        self.pages.iter().enumerate().find_map(|(page_idx, page)| {
            page.items
                .iter()
                .position(|item| item.id == id)
                .map(|item_idx| (page_idx, item_idx))
        })
    }
}
