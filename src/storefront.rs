use crate::render::{QueryDescriptor, RouteDescriptor};

use std::collections::HashMap;
use std::sync::Arc;

pub const ARTWORK_QUERY: &str = r#"query ArtworkQuery($artworkID: String!) {
  artwork(id: $artworkID) {
    internalID
    slug
    title
    date
    medium
    artistNames
    image { url(version: "large") aspectRatio }
    artist { internalID slug name }
    saleArtwork { lotLabel currentBid { display } sale { slug name isClosed } }
  }
}"#;

pub const CONFIRM_BID_QUERY: &str = r#"query ConfirmBidQuery($artworkID: String!, $saleID: String!) {
  artwork(id: $artworkID) {
    internalID
    slug
    title
    artistNames
    saleArtwork(saleID: $saleID) {
      lotLabel
      minimumNextBid { cents display }
      increments { cents display }
      sale { internalID slug name registrationStatus { internalID } }
    }
  }
  me { internalID }
}"#;

pub const ARTIST_RAIL_QUERY: &str = r#"query ArtistRailQuery($artistID: String!) {
  artist(id: $artistID) {
    artworksConnection(first: 6) {
      edges { node { slug title image { url(version: "square") } } }
    }
  }
}"#;

pub fn routes() -> Arc<[RouteDescriptor]> {
    vec![
        RouteDescriptor::redirect("/artworks/:artwork_id", "/artwork/:artwork_id"),
        RouteDescriptor::page("/artwork/:artwork_id", "artwork.jinja").query(
            QueryDescriptor::new("artwork", "ArtworkQuery", ARTWORK_QUERY)
                .bind("artworkID", "artwork_id")
                .required(),
        ),
        RouteDescriptor::page("/auction/:sale_id/bid/:artwork_id", "confirm-bid.jinja").query(
            QueryDescriptor::new("confirm_bid", "ConfirmBidQuery", CONFIRM_BID_QUERY)
                .bind("artworkID", "artwork_id")
                .bind("saleID", "sale_id")
                .required(),
        ),
    ]
    .into()
}

/// Operations templates may preload while rendering.
pub fn operations() -> HashMap<String, String> {
    HashMap::from([(
        "ArtistRailQuery".to_string(),
        ARTIST_RAIL_QUERY.to_string(),
    )])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::routes::{resolve, Location, Resolution};

    #[test]
    fn confirm_bid_binds_sale_and_artwork() {
        let routes = routes();
        match resolve(&routes, &Location::parse("/auction/spring-sale/bid/skull?bid=500000")) {
            Resolution::Page(matched) => {
                assert_eq!(matched.template, "confirm-bid.jinja");
                let variables = matched.queries[0].variables(&matched.params, &Default::default());
                assert_eq!(variables["saleID"], "spring-sale");
                assert_eq!(variables["artworkID"], "skull");
            }
            other => panic!("unexpected resolution {:?}", other),
        }
    }

    #[test]
    fn legacy_artwork_urls_redirect() {
        let routes = routes();
        assert!(matches!(
            resolve(&routes, &Location::parse("/artworks/skull")),
            Resolution::Redirect(url) if url == "/artwork/skull"
        ));
    }
}
