use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};

use crowdnest_database::{OrderDirection, QueryCriteria, SqlxCrud, SqlxFilterQuery};

use crate::error::{PlatformError, PlatformResult};

use super::UserAddress;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddressDraft {
    pub receiver_name: String,
    pub phone: String,
    pub province: String,
    pub city: String,
    pub district: String,
    pub detail_address: String,
    #[serde(default)]
    pub is_default: bool,
}

impl AddressDraft {
    pub fn validate(&self) -> PlatformResult<()> {
        if self.receiver_name.trim().is_empty() {
            return Err(PlatformError::validation("receiver name is required"));
        }
        let phone = self.phone.trim();
        if phone.len() < 5 || !phone.chars().all(|c| c.is_ascii_digit() || c == '+' || c == '-' || c == ' ') {
            return Err(PlatformError::validation("invalid phone number"));
        }
        if self.province.trim().is_empty() || self.city.trim().is_empty() || self.district.trim().is_empty() {
            return Err(PlatformError::validation("incomplete address: province, city and district are required"));
        }
        if self.detail_address.trim().is_empty() {
            return Err(PlatformError::validation("detail address is required"));
        }
        Ok(())
    }

    fn apply_to(self, address: &mut UserAddress) {
        address.receiver_name = self.receiver_name.trim().to_string();
        address.phone = self.phone.trim().to_string();
        address.province = self.province.trim().to_string();
        address.city = self.city.trim().to_string();
        address.district = self.district.trim().to_string();
        address.detail_address = self.detail_address.trim().to_string();
    }
}

/// Shipping addresses. A user with any address has exactly one default.
#[derive(Clone)]
pub struct AddressBook {
    db: PgPool,
}

impl AddressBook {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Default first, then newest.
    pub async fn list(&self, user_id: i64) -> PlatformResult<Vec<UserAddress>> {
        Ok(UserAddress::find_by_criteria(
            QueryCriteria::new()
                .add_valued_filter("user_id", "=", user_id)
                .order_by("is_default", OrderDirection::Desc)
                .order_by("created_at", OrderDirection::Desc)
                .order_by("id", OrderDirection::Desc),
            &self.db,
        ).await?)
    }

    pub async fn get_owned(&self, user_id: i64, address_id: i64) -> PlatformResult<Option<UserAddress>> {
        Ok(UserAddress::find_one_by_criteria(
            QueryCriteria::by_id(address_id).add_valued_filter("user_id", "=", user_id),
            &self.db,
        ).await?)
    }

    pub async fn create(&self, user_id: i64, draft: AddressDraft) -> PlatformResult<UserAddress> {
        draft.validate()?;
        let mut tx = self.db.begin().await?;

        let existing = UserAddress::count_by_criteria(
            QueryCriteria::new().add_valued_filter("user_id", "=", user_id),
            &mut *tx,
        ).await?;
        let make_default = draft.is_default || existing == 0;

        let mut address = UserAddress { user_id, ..Default::default() };
        draft.apply_to(&mut address);
        let mut address = address.create(&mut *tx).await?;

        if make_default {
            set_default_in_tx(&mut tx, user_id, address.id).await?;
            address.is_default = true;
        }

        tx.commit().await?;
        Ok(address)
    }

    pub async fn update(&self, user_id: i64, address_id: i64, draft: AddressDraft) -> PlatformResult<UserAddress> {
        draft.validate()?;
        let mut tx = self.db.begin().await?;

        let mut address = UserAddress::find_one_by_criteria(
            QueryCriteria::by_id(address_id).add_valued_filter("user_id", "=", user_id),
            &mut *tx,
        ).await?
            .ok_or_else(|| PlatformError::not_found("address not found"))?;

        let make_default = draft.is_default && !address.is_default;
        draft.apply_to(&mut address);
        let mut address = address.update(&mut *tx).await?;

        if make_default {
            set_default_in_tx(&mut tx, user_id, address.id).await?;
            address.is_default = true;
        }

        tx.commit().await?;
        Ok(address)
    }

    /// Deleting the default promotes the most recent remaining address.
    pub async fn delete(&self, user_id: i64, address_id: i64) -> PlatformResult<()> {
        let mut tx = self.db.begin().await?;

        let address = UserAddress::find_one_by_criteria(
            QueryCriteria::by_id(address_id).add_valued_filter("user_id", "=", user_id),
            &mut *tx,
        ).await?
            .ok_or_else(|| PlatformError::not_found("address not found"))?;
        let was_default = address.is_default;

        address.delete(&mut *tx).await
            .map_err(|e| PlatformError::on_foreign_key_violation(e, "address is referenced by an order"))?;

        if was_default {
            sqlx::query(
                "UPDATE user_addresses SET is_default = TRUE
                 WHERE id = (SELECT id FROM user_addresses WHERE user_id = $1 ORDER BY created_at DESC, id DESC LIMIT 1)"
            )
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn set_default(&self, user_id: i64, address_id: i64) -> PlatformResult<UserAddress> {
        let mut tx = self.db.begin().await?;

        let mut address = UserAddress::find_one_by_criteria(
            QueryCriteria::by_id(address_id).add_valued_filter("user_id", "=", user_id),
            &mut *tx,
        ).await?
            .ok_or_else(|| PlatformError::not_found("address not found"))?;

        set_default_in_tx(&mut tx, user_id, address_id).await?;
        tx.commit().await?;

        address.is_default = true;
        Ok(address)
    }
}

/// Clears every default for the user, then sets the chosen one.
async fn set_default_in_tx(tx: &mut Transaction<'_, Postgres>, user_id: i64, address_id: i64) -> PlatformResult<()> {
    sqlx::query("UPDATE user_addresses SET is_default = FALSE WHERE user_id = $1 AND is_default")
        .bind(user_id)
        .execute(&mut **tx)
        .await?;
    sqlx::query("UPDATE user_addresses SET is_default = TRUE WHERE id = $1 AND user_id = $2")
        .bind(address_id)
        .bind(user_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> AddressDraft {
        AddressDraft {
            receiver_name: "Ann".into(),
            phone: "+1 555-0100".into(),
            province: "Ontario".into(),
            city: "Toronto".into(),
            district: "Downtown".into(),
            detail_address: "1 King St".into(),
            is_default: false,
        }
    }

    #[test]
    fn complete_draft_is_valid() {
        assert!(draft().validate().is_ok());
    }

    #[test]
    fn each_missing_part_has_its_own_message() {
        let err = AddressDraft { receiver_name: " ".into(), ..draft() }.validate().unwrap_err();
        assert_eq!(err.to_string(), "receiver name is required");

        let err = AddressDraft { phone: "abc".into(), ..draft() }.validate().unwrap_err();
        assert_eq!(err.to_string(), "invalid phone number");

        let err = AddressDraft { city: "".into(), ..draft() }.validate().unwrap_err();
        assert!(err.to_string().starts_with("incomplete address"));

        let err = AddressDraft { detail_address: "".into(), ..draft() }.validate().unwrap_err();
        assert_eq!(err.to_string(), "detail address is required");
    }
}
