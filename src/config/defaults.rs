//! Default configuration and curated soundtrack reference lists.

use super::Config;

pub fn defaults() -> Config {
    Config::default()
}

/// Film, game and concert composers whose credits mark a song as score.
pub const COMPOSERS: &[&str] = &[
    "john williams",
    "hans zimmer",
    "ennio morricone",
    "bernard herrmann",
    "jerry goldsmith",
    "elmer bernstein",
    "max steiner",
    "maurice jarre",
    "lalo schifrin",
    "henry mancini",
    "thomas newman",
    "james newton howard",
    "alan silvestri",
    "danny elfman",
    "carter burwell",
    "gabriel yared",
    "rachel portman",
    "patrick doyle",
    "david arnold",
    "michael giacchino",
    "alexandre desplat",
    "clint mansell",
    "jonny greenwood",
    "mica levi",
    "ludwig goransson",
    "ramin djawadi",
    "bear mccreary",
    "joe hisaishi",
    "ryuichi sakamoto",
    "toru takemitsu",
    "akira ifukube",
    "vangelis",
    "klaus badelt",
    "steve jablonsky",
    "christophe beck",
    "alan menken",
    "bill conti",
    "john barry",
    "basil poledouris",
    "james horner",
    "howard shore",
    "craig armstrong",
    "dario marianelli",
    "gustavo santaolalla",
    "yann tiersen",
    "cliff martinez",
    "junkie xl",
    "tom holkenborg",
    "brian tyler",
    "tyler bates",
    "rupert gregson-williams",
    "harry gregson-williams",
    "henry jackman",
    "benjamin wallfisch",
    "daniel pemberton",
    "hildur guðnadóttir",
    "nicholas britell",
    "justin hurwitz",
    "steven price",
    "max richter",
    "ólafur arnalds",
    "nils frahm",
    "koji kondo",
    "nobuo uematsu",
    "yoko shimomura",
    "jeremy soule",
    "gustavo dudamel",
    "johann sebastian bach",
    "ludwig van beethoven",
    "wolfgang amadeus mozart",
    "franz schubert",
    "frederic chopin",
    "johannes brahms",
    "pyotr ilyich tchaikovsky",
    "claude debussy",
    "maurice ravel",
    "igor stravinsky",
    "sergei rachmaninoff",
    "franz liszt",
    "antonio vivaldi",
    "george frideric handel",
    "joseph haydn",
    "richard wagner",
    "gustav mahler",
    "dmitri shostakovich",
    "sergei prokofiev",
    "erik satie",
    "edvard grieg",
    "antonin dvorak",
    "arvo part",
    "philip glass",
    "steve reich",
    "michael nyman",
];

/// Matched case-insensitively on word boundaries in title and album name.
pub const SOUNDTRACK_KEYWORDS: &[&str] = &[
    "ost",
    "o.s.t.",
    "original soundtrack",
    "original score",
    "original motion picture",
    "motion picture soundtrack",
    "soundtrack",
    "theme from",
    "main theme",
    "orchestra",
    "orchestral",
    "symphony",
    "symphonic",
    "philharmonic",
    "philharmoniker",
    "orchester",
    "orchestre",
    "concerto",
];

/// Artist genre tags that mark non-vocal or score content.
pub const SOUNDTRACK_GENRES: &[&str] = &[
    "soundtrack",
    "japanese vgm",
    "video game music",
    "classical",
    "orchestra",
    "classical piano",
    "neoclassical",
    "chamber music",
    "choral",
    "requiem",
    "gregorian chant",
    "japanese classical",
];
