use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{config::PaginationSettings, dao::models::PageRequest};

/// Success envelope wrapping every non-paginated payload.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    /// Always `true`; failures use the error envelope instead.
    pub success: bool,
    /// Response payload.
    pub data: T,
}

impl<T> ApiResponse<T> {
    /// Wrap `data` in a successful envelope.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Paging metadata attached to list responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct Pagination {
    /// 1-based page served.
    pub current_page: u32,
    /// Rows per page.
    pub per_page: u32,
    /// Rows across every page.
    pub total: u64,
    /// Last page holding rows; `1` for an empty list.
    pub last_page: u32,
}

impl Pagination {
    /// Metadata for `page` of a list holding `total` rows.
    pub fn new(page: PageRequest, total: u64) -> Self {
        let per_page = u64::from(page.per_page.max(1));
        let last_page = total.div_ceil(per_page).max(1);
        Self {
            current_page: page.page,
            per_page: page.per_page,
            total,
            last_page: u32::try_from(last_page).unwrap_or(u32::MAX),
        }
    }
}

/// Success envelope of paginated list endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct Paginated<T> {
    /// Always `true`; failures use the error envelope instead.
    pub success: bool,
    /// Rows of the requested page.
    pub data: Vec<T>,
    /// Paging metadata.
    pub pagination: Pagination,
}

impl<T> Paginated<T> {
    /// Successful envelope around one page of rows.
    pub fn new(data: Vec<T>, pagination: Pagination) -> Self {
        Self {
            success: true,
            data,
            pagination,
        }
    }
}

/// `?page=&per_page=` query string.
#[derive(Debug, Default, Deserialize, IntoParams, Validate)]
pub struct PageQuery {
    /// 1-based page number.
    #[validate(range(min = 1))]
    pub page: Option<u32>,
    /// Rows per page.
    #[validate(range(min = 1, max = 100))]
    pub per_page: Option<u32>,
}

impl PageQuery {
    /// Fill missing values from configuration and clamp to the configured maximum.
    pub fn resolve(&self, settings: &PaginationSettings) -> PageRequest {
        PageRequest {
            page: self.page.unwrap_or(1).max(1),
            per_page: self
                .per_page
                .unwrap_or(settings.default_per_page)
                .clamp(1, settings.max_per_page.max(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_page_rounds_up_and_never_drops_below_one() {
        let page = PageRequest { page: 1, per_page: 20 };
        assert_eq!(Pagination::new(page, 0).last_page, 1);
        assert_eq!(Pagination::new(page, 20).last_page, 1);
        assert_eq!(Pagination::new(page, 21).last_page, 2);
    }

    #[test]
    fn page_query_falls_back_to_configured_defaults() {
        let settings = PaginationSettings {
            default_per_page: 15,
            max_per_page: 50,
        };
        let page = PageQuery::default().resolve(&settings);
        assert_eq!(page, PageRequest { page: 1, per_page: 15 });

        let page = PageQuery {
            page: Some(3),
            per_page: Some(90),
        }
        .resolve(&settings);
        assert_eq!(page, PageRequest { page: 3, per_page: 50 });
    }

    #[test]
    fn page_query_rejects_zero_page() {
        let query = PageQuery {
            page: Some(0),
            per_page: None,
        };
        assert!(query.validate().is_err());
    }
}
