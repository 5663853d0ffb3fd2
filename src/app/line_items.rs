//! Copies payment line items onto the transaction record.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::domain::{
    AddedLineItem, AtStep, CrmGateway, LineItem, LineItemError, LineItemSyncReport, Money,
    NewProductRow, PaymentProduct, PaymentProducts, PipelineStep, StepError,
};

const UNKNOWN_PRODUCT: &str = "Unknown product";
const UNAVAILABLE_PRODUCT: &str = "Product (details unavailable)";

pub struct ProductLineItemSync {
    gateway: Arc<dyn CrmGateway>,
    owner_type: String,
    measure_code: u32,
}

impl ProductLineItemSync {
    #[must_use]
    pub fn new(gateway: Arc<dyn CrmGateway>, owner_type: impl Into<String>, measure_code: u32) -> Self {
        Self {
            gateway,
            owner_type: owner_type.into(),
            measure_code,
        }
    }

    /// Fetch the payment's line items and resolve each to product detail.
    ///
    /// Items without a row reference are skipped. A failed detail lookup
    /// keeps the item with a zero price and the reason in `error`.
    #[instrument(skip(self))]
    pub async fn fetch(&self, payment_id: &str) -> Result<PaymentProducts, StepError> {
        let products = self
            .gateway
            .list_payment_products(payment_id)
            .await
            .at(PipelineStep::GetPaymentProducts)?;

        let mut items = Vec::with_capacity(products.len());
        for product in products {
            if let Some(row_id) = product.row_id.clone() {
                items.push(self.resolve(product, row_id).await);
            }
        }

        let products = PaymentProducts {
            items,
            fetch_error: None,
        };
        info!(
            count = products.items.len(),
            total = %products.total_amount(),
            "Payment line items fetched"
        );
        Ok(products)
    }

    async fn resolve(&self, product: PaymentProduct, row_id: String) -> LineItem {
        let quantity = product.quantity;
        let detail = match self.gateway.get_product_row(&row_id).await {
            Ok(Some(row)) => Ok(row),
            Ok(None) => Err("Product row not found".to_string()),
            Err(e) => Err(e.to_string()),
        };

        match detail {
            Ok(row) => {
                let price = row.price.unwrap_or(Money::ZERO);
                LineItem {
                    payment_product_id: product.id,
                    row_id,
                    quantity,
                    product_id: row.product_id,
                    product_name: row
                        .product_name
                        .filter(|n| !n.trim().is_empty())
                        .unwrap_or_else(|| UNKNOWN_PRODUCT.to_string()),
                    price,
                    total: price.times_quantity(quantity),
                    error: None,
                }
            }
            Err(reason) => {
                warn!(row_id = %row_id, error = %reason, "Product row detail unavailable");
                LineItem {
                    payment_product_id: product.id,
                    row_id,
                    quantity,
                    product_id: None,
                    product_name: UNAVAILABLE_PRODUCT.to_string(),
                    price: Money::ZERO,
                    total: Money::ZERO,
                    error: Some(reason),
                }
            }
        }
    }

    /// Create a product row under the transaction for each resolved item
    #[instrument(skip(self, products), fields(items = products.items.len()))]
    pub async fn attach(&self, transaction_id: &str, products: &PaymentProducts) -> LineItemSyncReport {
        let mut added_products = Vec::new();
        let mut errors = Vec::new();
        let mut create_failures = 0usize;

        for item in &products.items {
            if let Some(error) = &item.error {
                errors.push(LineItemError {
                    product_name: item.product_name.clone(),
                    error: error.clone(),
                });
                continue;
            }

            let row = NewProductRow {
                owner_id: transaction_id.to_string(),
                owner_type: self.owner_type.clone(),
                product_id: item.product_id.clone(),
                product_name: item.product_name.clone(),
                price: item.price,
                quantity: item.quantity,
                tax_included: false,
                measure_code: self.measure_code,
            };

            match self.gateway.add_product_row(&row).await {
                Ok(product_row_id) => added_products.push(AddedLineItem {
                    product_row_id,
                    product_name: row.product_name,
                    quantity: row.quantity,
                    price: row.price,
                }),
                Err(e) => {
                    warn!(product = %item.product_name, error = %e, "Failed to add product row");
                    create_failures += 1;
                    errors.push(LineItemError {
                        product_name: item.product_name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        LineItemSyncReport {
            success: create_failures == 0,
            products_added: added_products.len(),
            products_failed: errors.len(),
            added_products,
            errors,
            fetch_error: products.fetch_error.clone(),
        }
    }
}
