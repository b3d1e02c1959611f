//! Check an extractor's analysis against the brand catalog.
//!
//! The catalog decides which brands belong to the target. The extractor's own
//! `target_brands_found` list is compared with the catalog's reading of every
//! mention, and each disagreement is kept as a [`BrandMismatch`].

use geotrack_core::{
    AnalysisRecord, BrandCatalog, BrandMismatch, ClassifiedMention, MismatchKind, OwnedDomains,
    Relationship, ResponseAnalysis,
};

use crate::normalizer::extract_domain;

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

/// Build the record to persist for one analysed response.
///
/// `citation_domains` are the normalized domains actually cited by the
/// response; the owned ones become `target_domains_cited`.
#[must_use]
pub fn reconcile(
    analysis: &ResponseAnalysis,
    catalog: &BrandCatalog,
    citation_domains: &[String],
) -> AnalysisRecord {
    let mut target_brands_found = Vec::new();
    let mut mismatches = Vec::new();

    for reported in &analysis.target_brands_found {
        match catalog.lookup(reported) {
            Some(brand) if brand.relationship == Relationship::Portfolio => {
                push_unique(&mut target_brands_found, brand.key.clone());
            }
            _ => mismatches.push(BrandMismatch {
                kind: MismatchKind::ReportedTargetNotInCatalog,
                brand: reported.clone(),
            }),
        }
    }

    let mentions: Vec<ClassifiedMention> = analysis
        .all_mentions
        .iter()
        .map(|m| ClassifiedMention {
            mention: m.clone(),
            is_target_brand: catalog.is_target_brand(&m.brand),
        })
        .collect();

    for m in mentions.iter().filter(|m| m.is_target_brand) {
        let Some(brand) = catalog.lookup(&m.mention.brand) else {
            continue;
        };
        if !target_brands_found.contains(&brand.key) {
            mismatches.push(BrandMismatch {
                kind: MismatchKind::TargetMentionNotReported,
                brand: brand.key.clone(),
            });
            push_unique(&mut target_brands_found, brand.key.clone());
        }
    }

    let mut competitor_brands_found = Vec::new();
    for reported in &analysis.competitor_brands_found {
        match catalog.lookup(reported) {
            Some(brand) if brand.relationship == Relationship::Competitor => {
                push_unique(&mut competitor_brands_found, brand.key.clone());
            }
            // Portfolio brands never count as competitors.
            Some(_) => {}
            None => {
                let name = reported.trim().to_lowercase();
                if !name.is_empty() {
                    push_unique(&mut competitor_brands_found, name);
                }
            }
        }
    }

    AnalysisRecord {
        target_brands_found,
        competitor_brands_found,
        response_type: analysis.response_type,
        is_primary_recommendation: analysis.target_is_primary_recommendation,
        target_domains_cited: owned_domains_cited(catalog.owned_domains(), citation_domains),
        mentions,
        mismatches,
    }
}

fn owned_domains_cited(owned: &OwnedDomains, citation_domains: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for domain in citation_domains {
        let domain = extract_domain(domain);
        if owned.is_owned(&domain) {
            push_unique(&mut out, domain);
        }
    }
    out
}
