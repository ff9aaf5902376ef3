//! GraphQL documents sent to the Kivra BFF.

/// Receipts listing, one page of up to `limit` entries.
pub const RECEIPTS: &str = r"
query Receipts($search: String, $limit: Int, $offset: Int) {
  receiptsV2(search: $search, limit: $limit, offset: $offset) {
    __typename
    total
    offset
    limit
    list {
      __typename
      key
      purchaseDate
      totalAmount { formatted }
      attributes { isCopy isExpensed isReturn isTrashed }
      store { name logo { publicUrl } }
      attachments { id type }
      accessInfo { owner { isMe name } }
    }
  }
}
";

/// Full receipt content.
pub const RECEIPT_DETAILS: &str = r"
query ReceiptDetails($key: String!) {
  receiptV2(key: $key) {
    key
    content {
      header {
        totalPurchaseAmount
        subAmounts
        isoDate
        formattedDate
        text
        labels { type text }
        logo { publicUrl }
      }
      footer { text }
      items {
        allItems {
          text
          items {
            text
            type
            ... on ProductListItem { name money { formatted } quantityCost { formatted } }
            ... on GeneralDepositListItem { money { formatted } isRefund description text }
            ... on GeneralDiscountListItem { money { formatted } isRefund text }
            ... on GeneralModifierListItem { money { formatted } isRefund text }
          }
        }
        returnedItems { text }
      }
      storeInformation { text }
      paymentInformation { text }
    }
    campaigns { image { publicUrl } title key height width destinationUrl }
  }
}
";

/// Inbox letters, one page of `take` entries after the `after` cursor.
pub const LETTERS: &str = r"
query ContentList($filter: ContentListFilter!, $senderKey: String, $take: Int!, $after: ID) {
  contents(filter: $filter, senderKey: $senderKey, take: $take, after: $after) {
    total
    existsMore
    list {
      __typename
      key
      receivedAt
      attributes { isRead isTrashed isUpload }
      sender { key name iconUrl }
      subject
      accessInfo { owner { isMe name } }
    }
  }
}
";

/// Receipts requested in one listing call.
pub const RECEIPTS_LIMIT: u32 = 20_000;

/// Letters requested per page.
pub const LETTERS_PAGE_SIZE: u32 = 100;
