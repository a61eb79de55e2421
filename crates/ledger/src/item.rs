use chrono::{DateTime, Utc};

use stockrecon_core::{DomainError, DomainResult, ItemId};

use crate::command::{CreateItem, RecordMovement, UpdateItem};
use crate::price::Price;
use crate::stock_movement::NegativeBalancePolicy;

/// Current state of a tracked item: the single mutable source of truth the
/// ledgers are reconciled against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    id: ItemId,
    price: Price,
    stock: i64,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Item {
    /// Build the first state of a new item (version 1).
    pub fn create(cmd: &CreateItem) -> DomainResult<Self> {
        cmd.validate()?;
        Ok(Self {
            id: cmd.item_id,
            price: cmd.price,
            stock: cmd.stock,
            version: 1,
            created_at: cmd.occurred_at,
            updated_at: cmd.occurred_at,
        })
    }

    /// Rebuild a persisted item (stores only).
    pub fn restore(
        id: ItemId,
        price: Price,
        stock: i64,
        version: u64,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            price,
            stock,
            version,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn price(&self) -> Price {
        self.price
    }

    pub fn stock(&self) -> i64 {
        self.stock
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn ensure_item_id(&self, item_id: ItemId) -> DomainResult<()> {
        if self.id != item_id {
            return Err(DomainError::validation("item_id mismatch"));
        }
        Ok(())
    }

    /// `updated_at` never moves backwards, so ledger entries stamped with it
    /// stay in commit order even when a command's clock reading is stale.
    fn next(&self, price: Price, stock: i64, at: DateTime<Utc>) -> Self {
        Self {
            id: self.id,
            price,
            stock,
            version: self.version + 1,
            created_at: self.created_at,
            updated_at: at.max(self.updated_at),
        }
    }

    /// State after an absolute price/stock update.
    pub fn updated(&self, cmd: &UpdateItem) -> DomainResult<Self> {
        self.ensure_item_id(cmd.item_id)?;
        cmd.validate()?;
        cmd.expected_version.check(self.version)?;
        Ok(self.next(cmd.price, cmd.stock, cmd.occurred_at))
    }

    /// State after a signed stock movement.
    pub fn moved(&self, cmd: &RecordMovement, policy: NegativeBalancePolicy) -> DomainResult<Self> {
        self.ensure_item_id(cmd.item_id)?;
        cmd.validate()?;
        cmd.expected_version.check(self.version)?;

        let stock = self
            .stock
            .checked_add(cmd.kind.signed(cmd.quantity))
            .ok_or_else(|| DomainError::validation("stock out of range"))?;
        policy.check(self.id, stock)?;

        Ok(self.next(self.price, stock, cmd.occurred_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stock_movement::MovementKind;
    use stockrecon_core::ExpectedVersion;

    fn created(stock: i64) -> Item {
        Item::create(&CreateItem {
            item_id: ItemId::new(),
            price: Price::parse("10.00").unwrap(),
            stock,
            occurred_at: Utc::now(),
        })
        .unwrap()
    }

    fn movement(item: &Item, kind: MovementKind, quantity: i64) -> RecordMovement {
        RecordMovement {
            item_id: item.id(),
            kind,
            quantity,
            reason: None,
            expected_version: ExpectedVersion::Any,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn create_starts_at_version_one() {
        let item = created(5);
        assert_eq!(item.version(), 1);
        assert_eq!(item.stock(), 5);
        assert_eq!(item.created_at(), item.updated_at());
    }

    #[test]
    fn update_bumps_version_and_checks_expectation() {
        let item = created(5);
        let mut cmd = UpdateItem {
            item_id: item.id(),
            price: Price::parse("12.50").unwrap(),
            stock: 8,
            expected_version: ExpectedVersion::Exact(1),
            occurred_at: Utc::now(),
        };

        let next = item.updated(&cmd).unwrap();
        assert_eq!(next.version(), 2);
        assert_eq!(next.stock(), 8);
        assert_eq!(next.created_at(), item.created_at());

        cmd.expected_version = ExpectedVersion::Exact(7);
        assert!(matches!(item.updated(&cmd), Err(DomainError::Conflict(_))));
    }

    #[test]
    fn update_rejects_foreign_command() {
        let item = created(1);
        let cmd = UpdateItem {
            item_id: ItemId::new(),
            price: Price::zero(),
            stock: 1,
            expected_version: ExpectedVersion::Any,
            occurred_at: Utc::now(),
        };
        assert!(item.updated(&cmd).is_err());
    }

    #[test]
    fn movement_applies_signed_quantity() {
        let item = created(5);
        let after_in = item.moved(&movement(&item, MovementKind::In, 4), NegativeBalancePolicy::Reject).unwrap();
        assert_eq!(after_in.stock(), 9);

        let after_out = after_in
            .moved(&movement(&after_in, MovementKind::Out, 9), NegativeBalancePolicy::Reject)
            .unwrap();
        assert_eq!(after_out.stock(), 0);
        assert_eq!(after_out.version(), 3);
    }

    #[test]
    fn oversized_out_movement_follows_policy() {
        let item = created(2);
        let cmd = movement(&item, MovementKind::Out, 3);

        assert!(matches!(
            item.moved(&cmd, NegativeBalancePolicy::Reject),
            Err(DomainError::Consistency(_))
        ));
        let backorder = item.moved(&cmd, NegativeBalancePolicy::AllowBackorder).unwrap();
        assert_eq!(backorder.stock(), -1);
    }

    #[test]
    fn updated_at_never_moves_backwards() {
        let item = created(1);
        let stale = UpdateItem {
            item_id: item.id(),
            price: Price::zero(),
            stock: 1,
            expected_version: ExpectedVersion::Any,
            occurred_at: item.updated_at() - chrono::Duration::minutes(5),
        };
        assert_eq!(item.updated(&stale).unwrap().updated_at(), item.updated_at());
    }
}
