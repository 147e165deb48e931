use crate::registry::{ProtoHandle, Vnum};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shop {
    pub vnum: Vnum,
    /// `None` once the keeper's prototype has been purged.
    pub keeper: Option<ProtoHandle>,
    pub products: Vec<ProtoHandle>,
}

#[derive(Debug, Default, Clone)]
pub struct ShopTable {
    shops: Vec<Shop>,
}

impl ShopTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_shops(mut shops: Vec<Shop>) -> Self {
        shops.sort_by_key(|shop| shop.vnum);
        Self { shops }
    }

    pub fn shops(&self) -> &[Shop] {
        &self.shops
    }

    pub fn get(&self, vnum: Vnum) -> Option<&Shop> {
        self.shops
            .binary_search_by_key(&vnum, |shop| shop.vnum)
            .ok()
            .map(|index| &self.shops[index])
    }

    pub fn len(&self) -> usize {
        self.shops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shops.is_empty()
    }

    /// Visits every keeper reference. The mutator may clear the keeper.
    pub fn for_each_keeper_rnum(&mut self, mut mutator: impl FnMut(Vnum, &mut Option<ProtoHandle>)) {
        for shop in &mut self.shops {
            mutator(shop.vnum, &mut shop.keeper);
        }
    }

    /// Visits every product list; the mutator may drop entries.
    pub fn for_each_product_list(&mut self, mut mutator: impl FnMut(Vnum, &mut Vec<ProtoHandle>)) {
        for shop in &mut self.shops {
            mutator(shop.vnum, &mut shop.products);
        }
    }
}
