use serde_json::json;

use crate::url_rewrite::duplicates::DuplicateResolver;
use crate::url_rewrite::model::{EntityType, ProductCategoryRow, RewriteRow, StagingRow};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transformed {
    pub rewrite: RewriteRow,
    pub product_category: Option<ProductCategoryRow>,
}

pub fn product_view_path(product_id: i64) -> String {
    format!("catalog/product/view/id/{product_id}")
}

pub fn product_in_category_path(product_id: i64, category_id: i64) -> String {
    format!("catalog/product/view/id/{product_id}/category/{category_id}")
}

pub fn category_view_path(category_id: i64) -> String {
    format!("catalog/category/view/id/{category_id}")
}

/// Turn one staging row into its destination rows, renaming the request path
/// through `resolver` when the row loses a collision.
pub fn transform(row: &StagingRow, resolver: &mut DuplicateResolver) -> Transformed {
    let mut rewrite = RewriteRow {
        url_rewrite_id: row.id,
        entity_type: row.entity_type,
        entity_id: 0,
        request_path: row.request_path.clone(),
        target_path: row.target_path.clone(),
        redirect_type: row.redirect_type,
        store_id: row.store_id,
        description: row.description.clone(),
        is_autogenerated: row.is_system,
        metadata: String::new(),
    };

    match (row.product_id, row.category_id, row.cms_page_id) {
        (Some(product_id), Some(category_id), _) => {
            rewrite.entity_type = EntityType::Product;
            rewrite.entity_id = product_id;
            rewrite.metadata = json!({ "category_id": category_id }).to_string();
            rewrite.target_path = product_in_category_path(product_id, category_id);
        }
        (Some(product_id), None, _) => {
            rewrite.entity_type = EntityType::Product;
            rewrite.entity_id = product_id;
            rewrite.target_path = product_view_path(product_id);
        }
        (None, Some(category_id), _) => {
            rewrite.entity_type = EntityType::Category;
            rewrite.entity_id = category_id;
            // Manual redirects keep the target they were created with.
            if row.entity_type != EntityType::Custom {
                rewrite.target_path = category_view_path(category_id);
            }
        }
        (None, None, Some(cms_page_id)) => {
            rewrite.entity_id = cms_page_id;
        }
        (None, None, None) => {}
    }

    resolver.resolve(row, &mut rewrite);

    let product_category = match (row.is_system, row.product_id, row.category_id) {
        (true, Some(product_id), Some(category_id)) => Some(ProductCategoryRow {
            url_rewrite_id: row.id,
            category_id,
            product_id,
        }),
        _ => None,
    };

    Transformed {
        rewrite,
        product_category,
    }
}
