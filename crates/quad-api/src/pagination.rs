use quad_types::api::{PageQuery, Paginated, Pagination};

/// Build the pagination envelope for a page that was fetched with the
/// same (clamped) page/per_page values.
pub fn pagination(query: &PageQuery, total: i64) -> Pagination {
    let per_page = quad_db::clamp_per_page(query.per_page);
    let page = query.page.max(1);
    let total = total.max(0);
    let pages = (total as u64).div_ceil(per_page as u64) as u32;

    Pagination {
        page,
        per_page,
        total,
        pages,
        has_next: page < pages,
        has_prev: page > 1,
    }
}

pub fn paginated<T>(items: Vec<T>, query: &PageQuery, total: i64) -> Paginated<T> {
    Paginated {
        items,
        pagination: pagination(query, total),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(page: u32, per_page: u32) -> PageQuery {
        PageQuery { page, per_page }
    }

    #[test]
    fn partial_last_page_counts() {
        let p = pagination(&q(1, 50), 101);
        assert_eq!(p.pages, 3);
        assert!(p.has_next);
        assert!(!p.has_prev);
    }

    #[test]
    fn last_page_has_no_next() {
        let p = pagination(&q(3, 50), 101);
        assert!(!p.has_next);
        assert!(p.has_prev);
    }

    #[test]
    fn empty_result_set() {
        let p = pagination(&q(1, 50), 0);
        assert_eq!(p.pages, 0);
        assert!(!p.has_next);
        assert!(!p.has_prev);
    }

    #[test]
    fn per_page_is_clamped() {
        let p = pagination(&q(1, 500), 1000);
        assert_eq!(p.per_page, 100);
        assert_eq!(p.pages, 10);
    }
}
