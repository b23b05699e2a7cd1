use serde::{Deserialize, Serialize};

use pharmacore_core::ProductId;

use crate::allocation::Deduction;
use crate::batch::Batch;
use crate::events::TransferMove;

/// Result of a warehouse → store transfer.
///
/// `deductions[i]` was credited to the store as `created[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub message: String,
    pub product_id: ProductId,
    pub sku: String,
    pub quantity: i64,
    pub deductions: Vec<Deduction>,
    pub created: Vec<Batch>,
}

impl TransferReceipt {
    pub fn new(product_id: ProductId, sku: &str, deductions: Vec<Deduction>, created: Vec<Batch>) -> Self {
        let quantity = created.iter().map(|b| b.quantity).sum();
        Self {
            message: format!("Transferred {quantity} units of {sku} to store."),
            product_id,
            sku: sku.to_string(),
            quantity,
            deductions,
            created,
        }
    }

    pub fn moves(&self) -> Vec<TransferMove> {
        self.deductions
            .iter()
            .zip(&self.created)
            .map(|(d, b)| TransferMove {
                source_batch_id: d.batch_id,
                destination_batch_id: b.id,
                quantity: b.quantity,
            })
            .collect()
    }
}
