//! 1-based pagination shared by the event log and the archive

use serde::{Deserialize, Serialize};

use crate::core::error::{Result, WarError};

/// One page of an ordered collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub total_pages: usize,
}

impl<T: Clone> Page<T> {
    /// Cut page `page` (1-based) of `page_size` items out of `items`
    ///
    /// Page `p` always covers positions `[(p-1)*k, p*k)`, so boundaries do not
    /// move while an append-only source grows.
    pub fn slice(items: &[T], page: usize, page_size: usize) -> Result<Self> {
        validate(page, page_size)?;
        let total = items.len();
        let start = (page - 1).saturating_mul(page_size).min(total);
        let end = start.saturating_add(page_size).min(total);
        Ok(Self {
            items: items[start..end].to_vec(),
            page,
            page_size,
            total,
            total_pages: total_pages(total, page_size),
        })
    }
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

pub fn validate(page: usize, page_size: usize) -> Result<()> {
    if page == 0 {
        return Err(WarError::InvalidRequest("page numbers start at 1".into()));
    }
    if page_size == 0 {
        return Err(WarError::InvalidRequest("page_size must be positive".into()));
    }
    Ok(())
}

pub fn total_pages(total: usize, page_size: usize) -> usize {
    if page_size == 0 {
        0
    } else {
        total.div_ceil(page_size)
    }
}
