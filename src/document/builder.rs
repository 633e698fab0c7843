use chrono::NaiveDate;
use rand::Rng;

use crate::document::model::{Document, Product};

const MAX_PRODUCTS: usize = 5;

/// Random documents for load-testing the gateway.
pub struct DocumentBuilder;

impl DocumentBuilder {
    pub fn random() -> Document {
        Self::random_with(&mut rand::rng())
    }

    pub fn random_with<R: Rng + ?Sized>(rng: &mut R) -> Document {
        let products = (0..rng.random_range(1..=MAX_PRODUCTS))
            .map(|_| random_product(rng))
            .collect();

        Document {
            description: random_string(rng),
            doc_type: random_string(rng),
            doc_status: random_string(rng),
            import_request: rng.random_bool(0.5),
            owner_inn: random_string(rng),
            participant_inn: random_string(rng),
            producer_inn: random_string(rng),
            production_date: random_date(rng),
            production_type: random_string(rng),
            products,
            reg_date: random_date(rng),
            reg_number: random_string(rng),
        }
    }
}

fn random_product<R: Rng + ?Sized>(rng: &mut R) -> Product {
    Product {
        certificate_document: random_string(rng),
        certificate_document_date: random_date(rng),
        certificate_document_number: random_string(rng),
        owner_inn: random_string(rng),
        producer_inn: random_string(rng),
        production_date: random_date(rng),
        tnved_code: random_string(rng),
        uit_code: random_string(rng),
        uitu_code: random_string(rng),
    }
}

/// 5 to 9 lowercase ASCII letters.
fn random_string<R: Rng + ?Sized>(rng: &mut R) -> String {
    let len = rng.random_range(5..10);
    (0..len).map(|_| char::from(b'a' + rng.random_range(0..26u8))).collect()
}

/// `YYYY-MM-DD` between 2000 and 2023. Days stop at 28 so every month is valid.
fn random_date<R: Rng + ?Sized>(rng: &mut R) -> String {
    let year = rng.random_range(2000..2024);
    let month = rng.random_range(1..=12);
    let day = rng.random_range(1..=28);

    NaiveDate::from_ymd_opt(year, month, day)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}
