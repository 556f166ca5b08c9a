//! Word lists used to generate model names

pub const ADJECTIVES: &[&str] = &[
    "adorable", "agile", "ancient", "bitter", "blazing", "bold", "brave", "breezy", "bright",
    "bubbly", "calm", "cheerful", "chilly", "clever", "cosmic", "crispy", "curious", "dapper",
    "daring", "dazzling", "dusty", "eager", "earsplitting", "electric", "elegant", "fancy",
    "fearless", "fierce", "fluffy", "fuzzy", "gentle", "giddy", "glorious", "golden", "grumpy",
    "hasty", "hidden", "humble", "icy", "jolly", "jumpy", "keen", "lively", "lucky", "mellow",
    "mighty", "misty", "modest", "noble", "nimble", "odd", "peppy", "plucky", "polite", "proud",
    "quick", "quiet", "rapid", "rusty", "shiny", "silent", "sleepy", "snappy", "sneaky",
    "spicy", "steady", "stormy", "sunny", "swift", "tender", "tiny", "velvet", "vivid", "wild",
    "witty", "zealous", "zesty",
];

pub const FOODS: &[&str] = &[
    "almond", "anchovy", "apricot", "artichoke", "bagel", "baguette", "banana", "basil",
    "biscuit", "brioche", "brownie", "burrito", "cantaloupe", "caramel", "cashew", "cheddar",
    "cherry", "chestnut", "chutney", "clementine", "cobbler", "crepe", "croissant", "crumpet",
    "cupcake", "custard", "dumpling", "eclair", "falafel", "fig", "focaccia", "fondue",
    "gnocchi", "granola", "guava", "hazelnut", "hummus", "kiwi", "lasagna", "lemon", "lentil",
    "macaron", "mango", "meringue", "muffin", "noodle", "nougat", "olive", "omelette",
    "pancake", "papaya", "parsnip", "pastry", "peach", "pecan", "pretzel", "pudding",
    "quiche", "radish", "ravioli", "risotto", "samosa", "scone", "sorbet", "souffle",
    "strudel", "sushi", "taco", "tiramisu", "toffee", "truffle", "waffle", "walnut", "yam",
];
