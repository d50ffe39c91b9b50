/// Zero based offset of a one based page, pages below one count as the first.
pub fn offset(page: u64, page_size: u64) -> u64 {
    page.saturating_sub(1).saturating_mul(page_size)
}

/// Number of pages needed for `total` documents.
pub fn page_count(total: u64, page_size: u64) -> u64 {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size)
}

#[cfg(test)]
mod tests {
    use crate::pagination::{offset, page_count};

    #[test]
    fn offsets() {
        assert_eq!(offset(1, 25), 0);
        assert_eq!(offset(2, 25), 25);
        assert_eq!(offset(4, 10), 30);
        assert_eq!(offset(0, 10), 0);
    }

    #[test]
    fn pages() {
        assert_eq!(page_count(0, 10), 0);
        assert_eq!(page_count(10, 10), 1);
        assert_eq!(page_count(11, 10), 2);
    }
}
