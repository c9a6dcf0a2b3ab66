use mongodb::{bson::doc, Database, IndexModel};

pub async fn ensure_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    let alerts = db.collection::<mongodb::bson::Document>("alerts");

    // monitor scan: active alerts grouped by (market, symbol)
    {
        let model = IndexModel::builder()
            .keys(doc! { "triggered_at": 1, "market": 1, "symbol": 1 })
            .build();

        alerts.create_index(model, None).await?;
    }

    // user listings, newest first
    {
        let model = IndexModel::builder()
            .keys(doc! { "user_id": 1, "created_at": -1 })
            .build();

        alerts.create_index(model, None).await?;
    }

    Ok(())
}
