//! Pagination for the chunk reader

/// Page size when none is requested
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Largest accepted page size
pub const MAX_PAGE_SIZE: i64 = 200;

/// Pagination metadata calculated from total results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Current page number (1-indexed)
    pub page: i64,
    /// Rows per page after clamping
    pub page_size: i64,
    /// Total number of pages
    pub total_pages: i64,
    /// Offset for SQL LIMIT/OFFSET query
    pub offset: i64,
}

/// Calculate pagination metadata from total results and the requested page
///
/// Page size is clamped to `[1, MAX_PAGE_SIZE]` and the page to
/// `[1, total_pages]`.
///
/// # Examples
/// ```
/// use folio_server::pagination::calculate_pagination;
///
/// // 45 chunks at 20 per page = 3 pages (20 + 20 + 5)
/// let p = calculate_pagination(45, Some(2), None);
/// assert_eq!(p.page, 2);
/// assert_eq!(p.total_pages, 3);
/// assert_eq!(p.offset, 20);
///
/// // Requesting out-of-bounds page gets clamped
/// let p = calculate_pagination(45, Some(99), None);
/// assert_eq!(p.page, 3);
/// assert_eq!(p.offset, 40);
/// ```
pub fn calculate_pagination(
    total_results: i64,
    requested_page: Option<i64>,
    requested_page_size: Option<i64>,
) -> Pagination {
    let page_size = requested_page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let total_pages = (total_results + page_size - 1) / page_size;
    let page = requested_page.unwrap_or(1).max(1).min(total_pages.max(1));
    let offset = (page - 1) * page_size;

    Pagination {
        page,
        page_size,
        total_pages,
        offset,
    }
}
