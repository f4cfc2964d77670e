use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 { 1 }
fn default_per_page() -> u64 { 20 }

impl PaginationParams {
    /// Rows to skip. Saturates at `i64::MAX`, the largest offset SQL accepts.
    pub fn offset(&self) -> u64 {
        self.page
            .saturating_sub(1)
            .saturating_mul(self.limit())
            .min(i64::MAX as u64)
    }

    pub fn limit(&self) -> u64 {
        self.per_page.clamp(1, 100)
    }
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self { page: 1, per_page: 20 }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Paginated<T: Serialize> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub total_pages: u64,
}

impl<T: Serialize> Paginated<T> {
    pub fn new(items: Vec<T>, total: u64, params: &PaginationParams) -> Self {
        let per_page = params.limit();
        let total_pages = if total == 0 { 0 } else { (total + per_page - 1) / per_page };
        Self {
            items,
            total,
            page: params.page,
            per_page,
            total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_is_zero_based() {
        let params = PaginationParams { page: 3, per_page: 10 };
        assert_eq!(params.offset(), 20);
        assert_eq!(PaginationParams { page: 0, per_page: 10 }.offset(), 0);
    }

    #[test]
    fn limit_is_capped() {
        assert_eq!(PaginationParams { page: 1, per_page: 500 }.limit(), 100);
        assert_eq!(PaginationParams { page: 2, per_page: 500 }.offset(), 100);
        assert_eq!(PaginationParams { page: 1, per_page: 0 }.limit(), 1);
    }

    #[test]
    fn huge_page_saturates_instead_of_overflowing() {
        let params = PaginationParams { page: u64::MAX, per_page: 100 };
        assert_eq!(params.offset(), i64::MAX as u64);
        assert_eq!(params.offset() as i64, i64::MAX);
    }

    #[test]
    fn total_pages_rounds_up() {
        let page = Paginated::new(vec![1, 2], 41, &PaginationParams::default());
        assert_eq!(page.total_pages, 3);
        let empty: Paginated<u8> = Paginated::new(vec![], 0, &PaginationParams::default());
        assert_eq!(empty.total_pages, 0);
    }
}
